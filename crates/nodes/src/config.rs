//! Typed views over a node's configuration blob.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{NodeError, NodeResult};

/// Deserialize a node's `data` into its typed configuration.
///
/// A node saved without any data (`null`) yields the default configuration,
/// so the required-field checks that follow report what is missing.
pub fn parse<T>(label: &str, data: &Value) -> NodeResult<T>
where
    T: DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone())
        .map_err(|e| NodeError::configuration(format!("{label} node: invalid configuration: {e}")))
}

/// Return a required string field, treating blank as missing.
pub fn require<'a>(value: &'a Option<String>, label: &str, what: &str) -> NodeResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NodeError::configuration(format!("{label} node: {what} is missing"))),
    }
}

/// Return an optional string field, treating blank as absent.
pub fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        variable_name: Option<String>,
    }

    #[test]
    fn null_data_yields_defaults() {
        let cfg: Sample = parse("Sample", &Value::Null).unwrap();
        assert!(cfg.variable_name.is_none());
    }

    #[test]
    fn wrong_shape_is_a_configuration_error() {
        let err = parse::<Sample>("Sample", &json!({ "variableName": 3 })).unwrap_err();
        assert!(matches!(err, NodeError::Configuration(msg) if msg.starts_with("Sample node")));
    }

    #[test]
    fn blank_required_fields_are_missing() {
        let err = require(&Some("  ".into()), "HTTP Request", "endpoint").unwrap_err();
        assert_eq!(
            err,
            NodeError::configuration("HTTP Request node: endpoint is missing")
        );
        assert_eq!(require(&Some("x".into()), "L", "f"), Ok("x"));
        assert_eq!(optional(&Some(String::new())), None);
    }
}
