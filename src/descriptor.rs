//! ERC-7730 descriptor synthesis.
//!
//! The output follows the ERC-7730 v1 layout (`context`, `metadata`,
//! `display.formats` keyed by function signature, `intent`, `fields` with
//! `path` / `label` / `format` / `params`, `required`). Keys the standard does
//! not define are plain camelCase extensions: `metadata.description`,
//! `selector` and `stateMutability` on each format, and `display.events`.

use alloy::primitives::Address;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::ethereum::model::{AbiEvent, AbiFunction, AbiModel, AbiParameter, StateMutability};

pub const ERC7730_SCHEMA: &str = "https://eips.ethereum.org/assets/eip-7730/erc7730-v1.schema.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub context: DescriptorContext,
    pub metadata: DescriptorMetadata,
    pub display: Display,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorContext {
    #[serde(rename = "$id")]
    pub id: String,
    pub contract: ContractContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractContext {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub chain_id: u64,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorMetadata {
    pub owner: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Display {
    #[serde(serialize_with = "serialize_formats")]
    pub formats: Vec<FunctionDisplay>,
    pub events: Vec<EventDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDisplay {
    /// Map key in `display.formats`.
    #[serde(skip)]
    pub signature: String,
    pub intent: String,
    pub selector: String,
    pub state_mutability: StateMutability,
    pub fields: Vec<FieldDisplay>,
    pub required: Vec<String>,
    /// Return values, flattened like the inputs.
    pub outputs: Vec<FieldDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDisplay {
    pub signature: String,
    pub topic: String,
    pub label: String,
    pub anonymous: bool,
    pub fields: Vec<FieldDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDisplay {
    pub path: String,
    pub label: String,
    pub format: FieldFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<FieldParams>,
    /// Set on indexed event parameters.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub prominent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldFormat {
    Raw,
    AddressName,
    Amount,
    Date,
    Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldParams {
    AddressName { sources: Vec<String> },
    Date { encoding: String },
}

fn serialize_formats<S: Serializer>(formats: &[FunctionDisplay], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(formats.len()))?;
    for format in formats {
        map.serialize_entry(&format.signature, format)?;
    }
    map.end()
}

impl Descriptor {
    /// Records where the contract is deployed. Used for address-based requests.
    pub fn with_deployment(mut self, chain_id: u64, address: Address) -> Self {
        self.context.contract.deployments.push(Deployment {
            chain_id,
            address: address.to_checksum(None),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.owner
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    pub fn functions(&self) -> &[FunctionDisplay] {
        &self.display.formats
    }

    pub fn events(&self) -> &[EventDisplay] {
        &self.display.events
    }

    pub fn entry_count(&self) -> usize {
        self.display.formats.len() + self.display.events.len()
    }
}

const ERC20_FUNCTIONS: &[&str] = &[
    "totalSupply()",
    "balanceOf(address)",
    "transfer(address,uint256)",
    "transferFrom(address,address,uint256)",
    "approve(address,uint256)",
    "allowance(address,address)",
];

const ERC721_FUNCTIONS: &[&str] = &[
    "balanceOf(address)",
    "ownerOf(uint256)",
    "safeTransferFrom(address,address,uint256)",
    "transferFrom(address,address,uint256)",
    "approve(address,uint256)",
    "setApprovalForAll(address,bool)",
    "getApproved(uint256)",
    "isApprovedForAll(address,address)",
];

const ERC1155_FUNCTIONS: &[&str] = &[
    "balanceOf(address,uint256)",
    "balanceOfBatch(address[],uint256[])",
    "setApprovalForAll(address,bool)",
    "isApprovedForAll(address,address)",
    "safeTransferFrom(address,address,uint256,uint256,bytes)",
    "safeBatchTransferFrom(address,address,uint256[],uint256[],bytes)",
];

fn contract_name(model: &AbiModel) -> &'static str {
    let implements = |set: &[&str]| set.iter().all(|sig| model.has_function(sig));

    if implements(ERC1155_FUNCTIONS) {
        "ERC-1155 Collection"
    } else if implements(ERC721_FUNCTIONS) {
        "ERC-721 Collection"
    } else if implements(ERC20_FUNCTIONS) {
        "ERC-20 Token"
    } else {
        "Contract"
    }
}

/// Builds the display descriptor for a parsed ABI. Pure and deterministic.
pub fn synthesize(model: &AbiModel) -> Descriptor {
    let name = contract_name(model).to_string();
    let description = format!(
        "Clear signing descriptor for {} with {} functions and {} events",
        name,
        model.functions.len(),
        model.events.len()
    );

    Descriptor {
        schema: ERC7730_SCHEMA.to_string(),
        context: DescriptorContext {
            id: name.clone(),
            contract: ContractContext::default(),
        },
        metadata: DescriptorMetadata {
            owner: name,
            description,
        },
        display: Display {
            formats: model.functions.iter().map(function_display).collect(),
            events: model.events.iter().map(event_display).collect(),
        },
    }
}

fn function_display(function: &AbiFunction) -> FunctionDisplay {
    let mut fields = Vec::new();
    for (index, param) in function.inputs.iter().enumerate() {
        collect_fields(param, &param_path(param, index), &param_label(param, index), false, &mut fields);
    }
    let required = fields.iter().map(|f| f.path.clone()).collect();

    if function.state_mutability == StateMutability::Payable {
        fields.push(FieldDisplay {
            path: "@.value".to_string(),
            label: "Value".to_string(),
            format: FieldFormat::Amount,
            params: None,
            prominent: false,
        });
    }

    FunctionDisplay {
        signature: function.signature(),
        intent: humanize(&function.name),
        selector: function.selector_hex(),
        state_mutability: function.state_mutability,
        fields,
        required,
        outputs: output_fields(&function.outputs),
    }
}

fn output_fields(outputs: &[AbiParameter]) -> Vec<FieldDisplay> {
    let mut fields = Vec::new();
    for (index, param) in outputs.iter().enumerate() {
        let (path, label) = if param.name.is_empty() {
            (format!("output{}", index), format!("Output {}", index))
        } else {
            (param.name.clone(), humanize(&param.name))
        };
        collect_fields(param, &path, &label, false, &mut fields);
    }
    fields
}

fn event_display(event: &AbiEvent) -> EventDisplay {
    let mut fields = Vec::new();
    for (index, param) in event.inputs.iter().enumerate() {
        collect_fields(
            param,
            &param_path(param, index),
            &param_label(param, index),
            param.indexed,
            &mut fields,
        );
    }

    EventDisplay {
        signature: event.signature(),
        topic: event.topic_hex(),
        label: humanize(&event.name),
        anonymous: event.anonymous,
        fields,
    }
}

fn param_path(param: &AbiParameter, index: usize) -> String {
    if param.name.is_empty() {
        format!("arg{}", index)
    } else {
        param.name.clone()
    }
}

fn param_label(param: &AbiParameter, index: usize) -> String {
    let label = humanize(&param.name);
    if label.is_empty() {
        format!("Argument {}", index)
    } else {
        label
    }
}

/// Flattens a parameter into display fields. Tuple members get dotted paths,
/// array elements a `.[]` segment per dimension.
fn collect_fields(
    param: &AbiParameter,
    path: &str,
    label: &str,
    prominent: bool,
    out: &mut Vec<FieldDisplay>,
) {
    let dimensions = param.ty.matches('[').count();
    let path = format!("{}{}", path, ".[]".repeat(dimensions));

    if param.is_tuple() {
        for (index, component) in param.components.iter().enumerate() {
            let child_path = format!("{}.{}", path, param_path(component, index));
            let child_label = format!("{} {}", label, param_label(component, index));
            collect_fields(component, &child_path, &child_label, prominent, out);
        }
        return;
    }

    let (format, params) = field_hint(param.base_type(), &param.name);
    out.push(FieldDisplay {
        path,
        label: label.to_string(),
        format,
        params,
        prominent,
    });
}

const DATE_HINTS: &[&str] = &["deadline", "timestamp", "expiry", "expiration", "validuntil", "validafter"];
const DURATION_HINTS: &[&str] = &["duration", "period", "delay", "interval"];

fn field_hint(base_type: &str, name: &str) -> (FieldFormat, Option<FieldParams>) {
    let lowered = name.to_lowercase();

    match base_type {
        "address" => (
            FieldFormat::AddressName,
            Some(FieldParams::AddressName {
                sources: vec!["local".to_string(), "ens".to_string()],
            }),
        ),
        ty if ty.starts_with("uint") || ty.starts_with("int") => {
            if DATE_HINTS.iter().any(|hint| lowered.contains(hint)) {
                (
                    FieldFormat::Date,
                    Some(FieldParams::Date {
                        encoding: "timestamp".to_string(),
                    }),
                )
            } else if DURATION_HINTS.iter().any(|hint| lowered.contains(hint)) {
                (FieldFormat::Duration, None)
            } else {
                (FieldFormat::Raw, None)
            }
        }
        // bool, string, bytes, bytesN and function pointers render as-is.
        _ => (FieldFormat::Raw, None),
    }
}

/// Turns an identifier into a label: `transferFrom` -> `Transfer From`,
/// `_spender` -> `Spender`, `getURIValue` -> `Get URI Value`.
pub fn humanize(ident: &str) -> String {
    let mut words: Vec<String> = Vec::new();

    for part in ident.split('_').filter(|part| !part.is_empty()) {
        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && !current.is_empty() && c.is_uppercase() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                let starts_word = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower);
                if starts_word {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.push(c);
        }

        if !current.is_empty() {
            words.push(current);
        }
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
