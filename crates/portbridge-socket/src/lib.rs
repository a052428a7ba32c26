//! Socket stack: Phoenix frames, connectors, the authenticated transport
//! session and the Absinthe subscription session on top of it.

pub mod connector;
pub mod frame;
pub mod notifier;
pub mod session;
pub mod transport;

pub use connector::{ChannelConnector, Connector, Link, PeerLink, WsConnector};
pub use frame::PhoenixFrame;
pub use notifier::{Notifier, NotifierEvent, NotifierEvents, SubscriptionClient};
pub use session::AbsintheSession;
pub use transport::{TransportConfig, TransportEvent, TransportSession, DEFAULT_CHANNEL_TOPIC};
