/// Failures of the socket layer. These never reach the application
/// synchronously; the bridge turns them into `socketError` messages.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("link closed")]
    LinkClosed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("session shut down")]
    Shutdown,
}

impl SocketError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::LinkClosed => "link_closed",
            Self::Protocol(_) => "protocol",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Failures of a deferred DOM effect.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("element not found: {id}")]
    ElementNotFound { id: String },
    #[error("element is not a text field: {id}")]
    NotTextField { id: String },
}

impl DomError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ElementNotFound { .. } => "element_not_found",
            Self::NotTextField { .. } => "not_text_field",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("dom error: {0}")]
    Dom(#[from] DomError),

    #[error("outbound port channel closed")]
    OutboundClosed,

    #[error("invalid port message: {0}")]
    InvalidMessage(String),

    #[error("bridge shut down")]
    ShutDown,
}

impl BridgeError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Socket(e) => e.error_kind(),
            Self::Dom(e) => e.error_kind(),
            Self::OutboundClosed => "outbound_closed",
            Self::InvalidMessage(_) => "invalid_message",
            Self::ShutDown => "shut_down",
        }
    }
}
