//! Secret storage abstraction.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::Result;

/// A secret value (can be a single string or key-value pairs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// A single secret string.
    String(String),
    /// A map of key-value pairs.
    Map(HashMap<String, String>),
}

impl SecretValue {
    /// Parse a JSON object of string values, falling back to a plain string.
    pub fn from_json_or_string(raw: &str) -> Self {
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(raw) {
            Ok(map) => SecretValue::Map(
                map.into_iter()
                    .filter_map(|(k, v)| match v {
                        serde_json::Value::String(s) => Some((k, s)),
                        serde_json::Value::Null => None,
                        other => Some((k, other.to_string())),
                    })
                    .collect(),
            ),
            Err(_) => SecretValue::String(raw.to_string()),
        }
    }

    /// Get a specific key from a map secret.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            SecretValue::String(s) if key.is_empty() => Some(s),
            SecretValue::Map(m) => m.get(key).map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Trait for secret storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &'static str;

    /// Fetch the secret stored under `path`.
    async fn get(&self, path: &str) -> Result<SecretValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_json_object() {
        let value = SecretValue::from_json_or_string(
            r#"{"DOCKERHUB_USER": "acme", "DOCKERHUB_TOKEN": "t0k", "RETRIES": 3, "EMPTY": null}"#,
        );
        assert_eq!(value.get("DOCKERHUB_USER"), Some("acme"));
        assert_eq!(value.get("RETRIES"), Some("3"));
        assert_eq!(value.get("EMPTY"), None);
        assert_eq!(value.get("MISSING"), None);
    }

    #[test]
    fn test_plain_string_secret() {
        let value = SecretValue::from_json_or_string("just-a-token");
        assert_eq!(value.get(""), Some("just-a-token"));
        assert_eq!(value.get("token"), None);
    }
}
