use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::ClientId;

/// A query, mutation or subscription submitted by the application.
///
/// The payload is opaque to the bridge except for `clientId`, which is the
/// only key used to correlate later cancellations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDocument {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub variables: Value,
    pub client_id: ClientId,
}

impl OperationDocument {
    pub fn new(operation: impl Into<String>, client_id: ClientId) -> Self {
        Self {
            operation: operation.into(),
            variables: Value::Null,
            client_id,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Payload of the `doc` push: `{ query, variables }`, variables default to `{}`.
    pub fn push_payload(&self) -> Value {
        let variables = if self.variables.is_null() {
            json!({})
        } else {
            self.variables.clone()
        };
        json!({
            "query": self.operation,
            "variables": variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_application_payload() {
        let json = r#"{"operation":"subscription { roomMessages { id } }","variables":{"room":"a"},"clientId":"msgs"}"#;
        let doc: OperationDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.client_id().as_str(), "msgs");
        assert_eq!(doc.variables["room"], "a");
    }

    #[test]
    fn variables_are_optional() {
        let json = r#"{"operation":"query { me { id } }","clientId":"me"}"#;
        let doc: OperationDocument = serde_json::from_str(json).unwrap();
        assert!(doc.variables.is_null());
        let payload = doc.push_payload();
        assert_eq!(payload["query"], "query { me { id } }");
        assert_eq!(payload["variables"], json!({}));
    }

    #[test]
    fn push_payload_keeps_variables() {
        let doc = OperationDocument::new("query Q($id: ID!) { post(id: $id) { id } }", ClientId::from_raw("post"))
            .with_variables(json!({ "id": "7" }));
        assert_eq!(doc.push_payload()["variables"]["id"], "7");
    }

    #[test]
    fn missing_client_id_is_rejected() {
        let json = r#"{"operation":"query { me { id } }"}"#;
        assert!(serde_json::from_str::<OperationDocument>(json).is_err());
    }
}
