//! Provisioning output flattening.

use serde_json::Value;
use tracing::error;

use crate::domain::OutputMap;

/// Flatten the executor's raw outputs JSON.
///
/// Input looks like `{"name": {"value": ..., "type": ..., "sensitive": ...}}`;
/// the result maps each name to its `value`. Empty input and unparseable
/// input both yield an empty map. A parse failure never fails the step.
pub fn parse_outputs(raw: &str) -> OutputMap {
    if raw.trim().is_empty() {
        return OutputMap::new();
    }

    match serde_json::from_str::<serde_json::Map<String, Value>>(raw) {
        Ok(outputs) => outputs
            .into_iter()
            .map(|(name, entry)| {
                let value = match entry {
                    Value::Object(mut fields) => fields.remove("value").unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                (name, value)
            })
            .collect(),
        Err(e) => {
            error!(error = %e, "Failed to parse provisioning outputs");
            OutputMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_and_invalid_input() {
        assert!(parse_outputs("").is_empty());
        assert!(parse_outputs("   ").is_empty());
        assert!(parse_outputs("not json").is_empty());
        assert!(parse_outputs("[1, 2]").is_empty());
    }

    #[test]
    fn test_values_are_extracted() {
        let raw = r#"{
            "vpc_id": {"value": "vpc-123", "type": "string", "sensitive": false},
            "subnets": {"value": ["a", "b"], "type": ["list", "string"]},
            "size": {"value": 3}
        }"#;

        let outputs = parse_outputs(raw);
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs["vpc_id"], json!("vpc-123"));
        assert_eq!(outputs["subnets"], json!(["a", "b"]));
        assert_eq!(outputs["size"], json!(3));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let raw = r#"{"x": {"value": {"nested": true}}}"#;
        assert_eq!(parse_outputs(raw), parse_outputs(raw));
    }
}
