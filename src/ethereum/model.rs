use alloy::primitives::{keccak256, Selector, B256};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use serde_json::{json, Value};
use std::fmt;

/// A single input, output or event parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiParameter {
    pub name: String,
    /// Canonical type string. Tuples keep the `tuple` stem plus any array suffix.
    pub ty: String,
    pub components: Vec<AbiParameter>,
    pub indexed: bool,
    pub internal_type: Option<String>,
}

impl AbiParameter {
    pub fn is_tuple(&self) -> bool {
        self.ty.starts_with("tuple")
    }

    /// Type as it appears inside a signature, with tuples expanded to `(t1,t2)`.
    pub fn canonical_type(&self) -> String {
        match self.ty.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self.components.iter().map(|c| c.canonical_type()).collect();
                format!("({}){}", inner.join(","), suffix)
            }
            None => self.ty.clone(),
        }
    }

    /// The element type stripped of every array dimension.
    pub fn base_type(&self) -> &str {
        match self.ty.find('[') {
            Some(idx) => &self.ty[..idx],
            None => &self.ty,
        }
    }

    #[cfg(test)]
    fn to_json(&self, with_indexed: bool) -> Value {
        let mut value = json!({
            "name": self.name,
            "type": self.ty,
        });
        if let Some(internal_type) = &self.internal_type {
            value["internalType"] = json!(internal_type);
        }
        if !self.components.is_empty() {
            value["components"] =
                Value::Array(self.components.iter().map(|c| c.to_json(false)).collect());
        }
        if with_indexed {
            value["indexed"] = json!(self.indexed);
        }
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    NonPayable,
    Payable,
}

impl StateMutability {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateMutability::Pure => "pure",
            StateMutability::View => "view",
            StateMutability::NonPayable => "nonpayable",
            StateMutability::Payable => "payable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pure" => Some(StateMutability::Pure),
            "view" => Some(StateMutability::View),
            "nonpayable" => Some(StateMutability::NonPayable),
            "payable" => Some(StateMutability::Payable),
            _ => None,
        }
    }
}

impl fmt::Display for StateMutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParameter>,
    pub outputs: Vec<AbiParameter>,
    pub state_mutability: StateMutability,
    pub selector: Selector,
}

impl AbiFunction {
    pub fn new(
        name: String,
        inputs: Vec<AbiParameter>,
        outputs: Vec<AbiParameter>,
        state_mutability: StateMutability,
    ) -> Self {
        let selector = compute_selector(&signature_of(&name, &inputs));
        Self {
            name,
            inputs,
            outputs,
            state_mutability,
            selector,
        }
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`.
    pub fn signature(&self) -> String {
        signature_of(&self.name, &self.inputs)
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector.as_slice()))
    }

    #[cfg(test)]
    fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "inputs": self.inputs.iter().map(|p| p.to_json(false)).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(|p| p.to_json(false)).collect::<Vec<_>>(),
            "stateMutability": self.state_mutability.as_str(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiEvent {
    pub name: String,
    pub inputs: Vec<AbiParameter>,
    pub anonymous: bool,
    pub topic: B256,
}

impl AbiEvent {
    pub fn new(name: String, inputs: Vec<AbiParameter>, anonymous: bool) -> Self {
        let topic = keccak256(signature_of(&name, &inputs).as_bytes());
        Self {
            name,
            inputs,
            anonymous,
            topic,
        }
    }

    pub fn signature(&self) -> String {
        signature_of(&self.name, &self.inputs)
    }

    pub fn topic_hex(&self) -> String {
        format!("0x{}", hex::encode(self.topic.as_slice()))
    }

    #[cfg(test)]
    fn to_json(&self) -> Value {
        json!({
            "type": "event",
            "name": self.name,
            "inputs": self.inputs.iter().map(|p| p.to_json(true)).collect::<Vec<_>>(),
            "anonymous": self.anonymous,
        })
    }
}

/// Parsed contract interface. Functions are unique by selector, events by topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiModel {
    pub functions: Vec<AbiFunction>,
    pub events: Vec<AbiEvent>,
}

impl AbiModel {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.events.is_empty()
    }

    pub fn has_function(&self, signature: &str) -> bool {
        self.functions.iter().any(|f| f.signature() == signature)
    }

    /// Re-serialise the model as ABI JSON text: functions first, then events.
    #[cfg(test)]
    pub fn to_json(&self) -> String {
        let entries: Vec<Value> = self
            .functions
            .iter()
            .map(AbiFunction::to_json)
            .chain(self.events.iter().map(AbiEvent::to_json))
            .collect();
        Value::Array(entries).to_string()
    }
}

fn signature_of(name: &str, inputs: &[AbiParameter]) -> String {
    let types: Vec<String> = inputs.iter().map(|p| p.canonical_type()).collect();
    format!("{}({})", name, types.join(","))
}

fn compute_selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}
