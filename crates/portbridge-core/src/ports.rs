use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::OperationDocument;
use crate::ids::ClientId;

/// Container id the application uses to address the root document element.
pub const DOCUMENT_SENTINEL: &str = "DOCUMENT";

/// Messages the application sends to the bridge.
///
/// Wire shape: `{ "port": "<name>", "payload": <value> }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "port", content = "payload", rename_all = "camelCase")]
pub enum InboundPort {
    UpdateToken(RawToken),
    SendSocket(OperationDocument),
    CancelSocket(ClientId),
    ScrollTo(ScrollToArgs),
    ScrollToBottom(ScrollToBottomArgs),
    Autosize(AutosizeArgs),
    Select(String),
}

impl InboundPort {
    pub fn port_name(&self) -> &'static str {
        match self {
            Self::UpdateToken(_) => "updateToken",
            Self::SendSocket(_) => "sendSocket",
            Self::CancelSocket(_) => "cancelSocket",
            Self::ScrollTo(_) => "scrollTo",
            Self::ScrollToBottom(_) => "scrollToBottom",
            Self::Autosize(_) => "autosize",
            Self::Select(_) => "select",
        }
    }
}

/// Messages the bridge sends back to the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "port", content = "payload", rename_all = "camelCase")]
pub enum OutboundPort {
    SocketTokenUpdated,
    SocketStart(Value),
    SocketResult(Value),
    SocketError(Value),
    SocketAbort(Value),
}

impl OutboundPort {
    pub fn port_name(&self) -> &'static str {
        match self {
            Self::SocketTokenUpdated => "socketTokenUpdated",
            Self::SocketStart(_) => "socketStart",
            Self::SocketResult(_) => "socketResult",
            Self::SocketError(_) => "socketError",
            Self::SocketAbort(_) => "socketAbort",
        }
    }
}

/// Token as it arrives on the `updateToken` port. Redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawToken(String);

impl RawToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn into_secret(self) -> SecretString {
        SecretString::from(self.0)
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawToken([REDACTED])")
    }
}

/// Scroll target: the root document element or an element by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerId {
    Document,
    Element(String),
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        if s == DOCUMENT_SENTINEL {
            Self::Document
        } else {
            Self::Element(s)
        }
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        match id {
            ContainerId::Document => DOCUMENT_SENTINEL.to_owned(),
            ContainerId::Element(id) => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollToArgs {
    pub container_id: ContainerId,
    pub anchor_id: String,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollToBottomArgs {
    pub container_id: ContainerId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutosizeMethod {
    Create,
    Update,
    Destroy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutosizeArgs {
    pub method: AutosizeMethod,
    pub id: String,
}
