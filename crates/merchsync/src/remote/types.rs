//! Wire types for the remote commerce platform.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SyncError;

/// A product entity as the remote platform returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A price entity attached to a remote product.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePrice {
    pub id: String,
    #[serde(default)]
    pub unit_amount: i64,
    #[serde(default)]
    pub currency: String,
}

/// Paginated list envelope used by search and list endpoints.
#[derive(Debug, Deserialize)]
pub struct RemoteList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Deserialize a response body, mapping malformed payloads to an internal
/// error rather than a retryable one.
pub fn parse<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, SyncError> {
    serde_json::from_value(body).map_err(|e| SyncError::internal(format!("malformed response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_parses_with_metadata() {
        let product: RemoteProduct = parse(json!({
            "id": "prod_42",
            "name": "Widget",
            "metadata": {"source_id": "abc"},
        }))
        .unwrap();
        assert_eq!(product.id, "prod_42");
        assert_eq!(product.metadata.get("source_id").map(String::as_str), Some("abc"));
    }

    #[test]
    fn list_defaults_to_empty_data() {
        let list: RemoteList<RemotePrice> = parse(json!({})).unwrap();
        assert!(list.data.is_empty());
    }

    #[test]
    fn malformed_body_is_an_internal_error() {
        let err = parse::<RemoteProduct>(json!({"name": "no id"})).unwrap_err();
        assert!(matches!(err, SyncError::Internal { .. }));
        assert!(!err.is_retryable());
    }
}
