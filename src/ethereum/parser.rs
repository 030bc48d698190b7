use alloy::dyn_abi::DynSolType;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use super::model::{AbiEvent, AbiFunction, AbiModel, AbiParameter, StateMutability};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed ABI JSON: {0}")]
    MalformedJson(String),

    #[error("Unknown ABI entry type '{kind}' at index {index}")]
    UnknownEntryType { index: usize, kind: String },

    #[error("ABI {kind} entry at index {index} has no name")]
    MissingName { index: usize, kind: String },

    #[error("Invalid parameter type '{ty}' in '{entry}'")]
    InvalidParameterType { entry: String, ty: String },

    #[error("Invalid state mutability '{value}' for function '{entry}'")]
    InvalidMutability { entry: String, value: String },

    #[error("Duplicate ABI signature: {0}")]
    DuplicateSignature(String),

    #[error("Declared selector {declared} does not match computed selector {computed} for '{signature}'")]
    SelectorMismatch {
        signature: String,
        declared: String,
        computed: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    state_mutability: Option<String>,
    constant: Option<bool>,
    payable: Option<bool>,
    #[serde(default)]
    anonymous: bool,
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParam {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    components: Vec<RawParam>,
    #[serde(default)]
    indexed: bool,
    internal_type: Option<String>,
}

/// Parse raw ABI JSON text into an [`AbiModel`].
pub fn parse(raw: &str) -> Result<AbiModel, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

    let entries = value.as_array().ok_or_else(|| {
        ParseError::MalformedJson("expected a JSON array of ABI entries".to_string())
    })?;

    let mut model = AbiModel::default();
    let mut selectors = HashSet::new();
    let mut topics = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let raw_entry = RawEntry::deserialize(entry)
            .map_err(|e| ParseError::MalformedJson(format!("entry {}: {}", index, e)))?;

        // Solidity treats an entry without `type` as a function.
        let kind = raw_entry.kind.clone().unwrap_or_else(|| "function".to_string());

        match kind.as_str() {
            "function" => {
                let function = parse_function(index, raw_entry)?;
                if !selectors.insert(function.selector) {
                    return Err(ParseError::DuplicateSignature(function.signature()));
                }
                model.functions.push(function);
            }
            "event" => {
                let event = parse_event(index, raw_entry)?;
                if !topics.insert(event.topic) {
                    return Err(ParseError::DuplicateSignature(event.signature()));
                }
                model.events.push(event);
            }
            "constructor" | "fallback" | "receive" | "error" => {
                let label = raw_entry.name.clone().unwrap_or_else(|| kind.clone());
                parse_params(&label, raw_entry.inputs, false)?;
                debug!("Skipping {} entry at index {}", kind, index);
            }
            _ => return Err(ParseError::UnknownEntryType { index, kind }),
        }
    }

    debug!(
        "Parsed ABI with {} functions and {} events",
        model.functions.len(),
        model.events.len()
    );
    Ok(model)
}

fn require_name(index: usize, kind: &str, name: Option<String>) -> Result<String, ParseError> {
    match name {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(ParseError::MissingName {
            index,
            kind: kind.to_string(),
        }),
    }
}

fn parse_function(index: usize, raw: RawEntry) -> Result<AbiFunction, ParseError> {
    let name = require_name(index, "function", raw.name)?;

    let state_mutability = match raw.state_mutability.as_deref() {
        Some(value) => {
            StateMutability::parse(value).ok_or_else(|| ParseError::InvalidMutability {
                entry: name.clone(),
                value: value.to_string(),
            })?
        }
        // Pre-0.4.16 ABIs only carry the `constant` / `payable` flags.
        None if raw.payable == Some(true) => StateMutability::Payable,
        None if raw.constant == Some(true) => StateMutability::View,
        None => StateMutability::NonPayable,
    };

    let inputs = parse_params(&name, raw.inputs, false)?;
    let outputs = parse_params(&name, raw.outputs, false)?;
    let function = AbiFunction::new(name, inputs, outputs, state_mutability);

    if let Some(declared) = raw.selector {
        let computed = function.selector_hex();
        let normalized = format!("0x{}", declared.trim_start_matches("0x").to_lowercase());
        if normalized != computed {
            return Err(ParseError::SelectorMismatch {
                signature: function.signature(),
                declared,
                computed,
            });
        }
    }

    Ok(function)
}

fn parse_event(index: usize, raw: RawEntry) -> Result<AbiEvent, ParseError> {
    let name = require_name(index, "event", raw.name)?;
    let inputs = parse_params(&name, raw.inputs, true)?;
    Ok(AbiEvent::new(name, inputs, raw.anonymous))
}

/// `indexed` is only meaningful on top-level event inputs and is dropped elsewhere.
fn parse_params(
    entry: &str,
    params: Vec<RawParam>,
    allow_indexed: bool,
) -> Result<Vec<AbiParameter>, ParseError> {
    params
        .into_iter()
        .map(|p| parse_param(entry, p, allow_indexed))
        .collect()
}

fn parse_param(entry: &str, raw: RawParam, allow_indexed: bool) -> Result<AbiParameter, ParseError> {
    let components = parse_params(entry, raw.components, false)?;
    let ty = canonicalize_type(&raw.ty, !components.is_empty()).ok_or_else(|| {
        ParseError::InvalidParameterType {
            entry: entry.to_string(),
            ty: raw.ty.clone(),
        }
    })?;

    Ok(AbiParameter {
        name: raw.name.unwrap_or_default(),
        ty,
        components,
        indexed: allow_indexed && raw.indexed,
        internal_type: raw.internal_type,
    })
}

/// Returns the canonical form of an ABI type string, or `None` if it is
/// outside the recognised grammar. Tuples must carry components and
/// elementary types must not.
fn canonicalize_type(ty: &str, has_components: bool) -> Option<String> {
    let ty = ty.trim();

    if let Some(suffix) = ty.strip_prefix("tuple") {
        return (has_components && is_array_suffix(suffix)).then(|| format!("tuple{}", suffix));
    }

    if has_components || ty.starts_with('(') {
        return None;
    }

    let dims = ty.find('[').map(|idx| &ty[idx..]).unwrap_or("");
    if !is_array_suffix(dims) {
        return None;
    }

    match DynSolType::parse(ty).ok()? {
        DynSolType::Tuple(_) => None,
        parsed => Some(parsed.sol_type_name().into_owned()),
    }
}

/// Matches zero or more `[]` / `[N]` dimensions.
fn is_array_suffix(mut suffix: &str) -> bool {
    while !suffix.is_empty() {
        let Some(rest) = suffix.strip_prefix('[') else {
            return false;
        };
        let Some(end) = rest.find(']') else {
            return false;
        };
        let size = &rest[..end];
        if !size.chars().all(|c| c.is_ascii_digit()) || size.starts_with('0') {
            return false;
        }
        suffix = &rest[end + 1..];
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::json_abi::JsonAbi;

    const ERC20_ABI: &str = r#"[
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"event","name":"Transfer","inputs":[{"name":"from","type":"address","indexed":true},{"name":"to","type":"address","indexed":true},{"name":"value","type":"uint256","indexed":false}],"anonymous":false},
        {"type":"constructor","inputs":[{"name":"supply","type":"uint256"}],"stateMutability":"nonpayable"},
        {"type":"error","name":"InsufficientBalance","inputs":[{"name":"needed","type":"uint256"}]}
    ]"#;

    const TUPLE_ABI: &str = r#"[
        {"type":"function","name":"fillOrders","inputs":[
            {"name":"orders","type":"tuple[]","internalType":"struct Order[]","components":[
                {"name":"maker","type":"address"},
                {"name":"amounts","type":"uint256[2]"},
                {"name":"meta","type":"tuple","components":[{"name":"deadline","type":"uint64"},{"name":"tag","type":"bytes32"}]}
            ]}
        ],"outputs":[],"stateMutability":"payable"}
    ]"#;

    #[test]
    fn test_parse_erc20() {
        let model = parse(ERC20_ABI).unwrap();
        assert_eq!(model.functions.len(), 2);
        assert_eq!(model.events.len(), 1);
        assert_eq!(model.functions[0].selector_hex(), "0xa9059cbb");
        assert_eq!(model.functions[1].state_mutability, StateMutability::View);
        assert!(model.events[0].inputs[0].indexed);
        assert!(!model.events[0].inputs[2].indexed);
    }

    #[test]
    fn test_selectors_match_alloy() {
        let model = parse(TUPLE_ABI).unwrap();
        let reference: JsonAbi = serde_json::from_str(TUPLE_ABI).unwrap();
        let expected = reference.functions().next().unwrap().selector();
        assert_eq!(model.functions[0].selector, expected);
        assert_eq!(
            model.functions[0].signature(),
            "fillOrders((address,uint256[2],(uint64,bytes32))[])"
        );
    }

    #[test]
    fn test_empty_abi() {
        let model = parse("[]").unwrap();
        assert!(model.is_empty());
    }

    const STRAY_INDEXED_ABI: &str = r#"[
        {"type":"function","name":"f","inputs":[{"name":"x","type":"uint256","indexed":true}],"outputs":[{"name":"","type":"bool","indexed":true}]},
        {"type":"event","name":"Settled","inputs":[{"name":"order","type":"tuple","indexed":true,"components":[{"name":"id","type":"uint256","indexed":true}]}],"anonymous":false}
    ]"#;

    #[test]
    fn test_parse_is_idempotent() {
        for raw in [ERC20_ABI, TUPLE_ABI, STRAY_INDEXED_ABI, "[]"] {
            let first = parse(raw).unwrap();
            let second = parse(&first.to_json()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_indexed_only_on_event_inputs() {
        let model = parse(STRAY_INDEXED_ABI).unwrap();
        assert!(!model.functions[0].inputs[0].indexed);
        assert!(!model.functions[0].outputs[0].indexed);
        assert!(model.events[0].inputs[0].indexed);
        assert!(!model.events[0].inputs[0].components[0].indexed);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse("[{"), Err(ParseError::MalformedJson(_))));
        assert!(matches!(parse("{}"), Err(ParseError::MalformedJson(_))));
        assert!(matches!(parse("[42]"), Err(ParseError::MalformedJson(_))));
    }

    #[test]
    fn test_unknown_entry_type() {
        let err = parse(r#"[{"type":"modifier","name":"onlyOwner"}]"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownEntryType {
                index: 0,
                kind: "modifier".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_parameter_types() {
        for ty in ["uint7", "bytes33", "strin", "address[", "tuple", "(address,uint256)", "uint256[0]"] {
            let raw = format!(
                r#"[{{"type":"function","name":"f","inputs":[{{"name":"x","type":"{}"}}],"outputs":[]}}]"#,
                ty
            );
            assert!(
                matches!(parse(&raw), Err(ParseError::InvalidParameterType { .. })),
                "type {} should be rejected",
                ty
            );
        }
    }

    #[test]
    fn test_invalid_nested_component() {
        let raw = r#"[{"type":"function","name":"f","inputs":[{"name":"s","type":"tuple","components":[{"name":"bad","type":"uint300"}]}],"outputs":[]}]"#;
        assert!(matches!(
            parse(raw),
            Err(ParseError::InvalidParameterType { ty, .. }) if ty == "uint300"
        ));
    }

    #[test]
    fn test_uint_alias_is_canonicalized() {
        let raw = r#"[{"type":"function","name":"set","inputs":[{"name":"v","type":"uint"}],"outputs":[]}]"#;
        let model = parse(raw).unwrap();
        assert_eq!(model.functions[0].inputs[0].ty, "uint256");
        assert_eq!(model.functions[0].signature(), "set(uint256)");
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let raw = r#"[
            {"type":"function","name":"set","inputs":[{"name":"a","type":"uint256"}],"outputs":[]},
            {"type":"function","name":"set","inputs":[{"name":"b","type":"uint"}],"outputs":[],"stateMutability":"payable"}
        ]"#;
        assert_eq!(
            parse(raw).unwrap_err(),
            ParseError::DuplicateSignature("set(uint256)".to_string())
        );

        let events = r#"[
            {"type":"event","name":"Ping","inputs":[],"anonymous":false},
            {"type":"event","name":"Ping","inputs":[],"anonymous":false}
        ]"#;
        assert!(matches!(parse(events), Err(ParseError::DuplicateSignature(_))));
    }

    #[test]
    fn test_overloads_are_distinct() {
        let raw = r#"[
            {"type":"function","name":"safeTransferFrom","inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"id","type":"uint256"}],"outputs":[]},
            {"type":"function","name":"safeTransferFrom","inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"id","type":"uint256"},{"name":"data","type":"bytes"}],"outputs":[]}
        ]"#;
        assert_eq!(parse(raw).unwrap().functions.len(), 2);
    }

    #[test]
    fn test_declared_selector_checked() {
        let ok = r#"[{"type":"function","name":"transfer","selector":"0xa9059cbb","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[]}]"#;
        assert!(parse(ok).is_ok());

        let bad = r#"[{"type":"function","name":"transfer","selector":"0xdeadbeef","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[]}]"#;
        assert!(matches!(parse(bad), Err(ParseError::SelectorMismatch { .. })));
    }

    #[test]
    fn test_legacy_mutability_flags() {
        let raw = r#"[
            {"name":"name","inputs":[],"outputs":[{"name":"","type":"string"}],"constant":true},
            {"name":"deposit","inputs":[],"outputs":[],"payable":true}
        ]"#;
        let model = parse(raw).unwrap();
        assert_eq!(model.functions[0].state_mutability, StateMutability::View);
        assert_eq!(model.functions[1].state_mutability, StateMutability::Payable);
    }

    #[test]
    fn test_missing_name_and_bad_mutability() {
        assert!(matches!(
            parse(r#"[{"type":"event","inputs":[]}]"#),
            Err(ParseError::MissingName { index: 0, .. })
        ));
        assert!(matches!(
            parse(r#"[{"type":"function","name":"f","inputs":[],"stateMutability":"constant"}]"#),
            Err(ParseError::InvalidMutability { .. })
        ));
    }
}
