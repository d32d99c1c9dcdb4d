// Copyright 2025 Oxide Computer Company

//! Node-model glue: raw bytes to a generic node tree.
//!
//! The comparison core consumes only `serde_json::Value` trees. JSON is
//! tried first; YAML input (the other common serialization of OpenAPI
//! documents) is decoded into the same tree.

use serde_json::Value;

use crate::error::LoadError;

/// Decode a document's bytes into a generic node tree.
pub fn parse_document(location: &str, bytes: &[u8]) -> Result<Value, LoadError> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    serde_yaml::from_slice::<Value>(bytes).map_err(|_| LoadError::Decode {
        location: location.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::parse_document;

    #[test]
    fn parses_json() {
        let v = parse_document("a.json", br#"{"openapi": "3.0.0"}"#).unwrap();
        assert_eq!(v["openapi"], "3.0.0");
    }

    #[test]
    fn parses_yaml() {
        let v = parse_document("a.yaml", b"openapi: 3.0.0\ninfo:\n  title: t\n").unwrap();
        assert_eq!(v["info"]["title"], "t");
    }

    #[test]
    fn rejects_garbage() {
        // A bare scalar parses as YAML; unbalanced flow syntax does not.
        assert!(parse_document("a", b"{unclosed: [").is_err());
    }
}
