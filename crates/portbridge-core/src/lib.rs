pub mod document;
pub mod errors;
pub mod ids;
pub mod ports;

pub use document::OperationDocument;
pub use errors::{BridgeError, DomError, SocketError};
pub use ids::{ClientId, NotifierId};
pub use ports::{
    AutosizeArgs, AutosizeMethod, ContainerId, InboundPort, OutboundPort, RawToken, ScrollToArgs,
    ScrollToBottomArgs, DOCUMENT_SENTINEL,
};
