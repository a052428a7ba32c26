//! Phoenix channel frames (serializer v2): `[join_ref, ref, topic, event, payload]`.

use portbridge_core::SocketError;
use serde_json::{json, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";

pub const EVENT_DOC: &str = "doc";
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";
pub const EVENT_SUBSCRIPTION_DATA: &str = "subscription:data";

#[derive(Clone, Debug, PartialEq)]
pub struct PhoenixFrame {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl PhoenixFrame {
    pub fn new(
        join_ref: Option<String>,
        msg_ref: Option<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            msg_ref,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Join request; Phoenix uses the join ref as the message ref.
    pub fn join(join_ref: String, topic: impl Into<String>) -> Self {
        Self::new(Some(join_ref.clone()), Some(join_ref), topic, EVENT_JOIN, json!({}))
    }

    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new(None, Some(msg_ref), PHOENIX_TOPIC, EVENT_HEARTBEAT, json!({}))
    }

    pub fn encode(&self) -> String {
        json!([self.join_ref, self.msg_ref, self.topic, self.event, self.payload]).to_string()
    }

    pub fn decode(text: &str) -> Result<Self, SocketError> {
        let (join_ref, msg_ref, topic, event, payload): (
            Option<String>,
            Option<String>,
            String,
            String,
            Value,
        ) = serde_json::from_str(text).map_err(|e| SocketError::Protocol(e.to_string()))?;
        Ok(Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        })
    }

    /// `status` of a `phx_reply` payload.
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// `response` of a `phx_reply` payload, `null` when absent.
    pub fn reply_response(&self) -> Value {
        self.payload.get("response").cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn encode_join() {
        let frame = PhoenixFrame::join("1".into(), "__absinthe__:control");
        assert_eq!(
            frame.encode(),
            r#"["1","1","__absinthe__:control","phx_join",{}]"#
        );
    }

    #[test]
    fn encode_heartbeat_has_null_join_ref() {
        let frame = PhoenixFrame::heartbeat("9".into());
        assert_eq!(frame.encode(), r#"[null,"9","phoenix","heartbeat",{}]"#);
    }

    #[test]
    fn decode_reply() {
        let text = r#"["1","3","__absinthe__:control","phx_reply",{"status":"ok","response":{"subscriptionId":"__absinthe__:doc:-57:AB12"}}]"#;
        let frame = PhoenixFrame::decode(text).unwrap();
        assert_eq!(frame.event, EVENT_REPLY);
        assert_eq!(frame.msg_ref.as_deref(), Some("3"));
        assert_eq!(frame.reply_status(), Some("ok"));
        assert_eq!(
            frame.reply_response()["subscriptionId"],
            "__absinthe__:doc:-57:AB12"
        );
    }

    #[test]
    fn decode_push_without_refs() {
        let text = r#"[null,null,"__absinthe__:doc:-57:AB12","subscription:data",{"result":{"data":{"n":1}},"subscriptionId":"__absinthe__:doc:-57:AB12"}]"#;
        let frame = PhoenixFrame::decode(text).unwrap();
        assert!(frame.join_ref.is_none());
        assert!(frame.msg_ref.is_none());
        assert_eq!(frame.event, EVENT_SUBSCRIPTION_DATA);
        assert_eq!(frame.payload["result"]["data"]["n"], 1);
    }

    #[test]
    fn decode_rejects_object_frames() {
        let result = PhoenixFrame::decode(r#"{"topic":"x","event":"y"}"#);
        assert_matches!(result, Err(SocketError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_short_arrays() {
        let result = PhoenixFrame::decode(r#"[null,"1","phoenix"]"#);
        assert_matches!(result, Err(SocketError::Protocol(_)));
    }

    #[test]
    fn reply_response_defaults_to_null() {
        let frame = PhoenixFrame::new(None, Some("2".into()), "t", EVENT_REPLY, json!({"status":"ok"}));
        assert!(frame.reply_response().is_null());
    }
}
