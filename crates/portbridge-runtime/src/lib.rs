//! Bridge runtime: settings, the socket context, the port bridge itself and
//! the JSON-lines host that drives it.

pub mod bridge;
pub mod context;
pub mod host;
pub mod settings;

pub use bridge::PortBridge;
pub use context::BridgeContext;
pub use host::{run_host, HostError, HostSummary};
pub use settings::{load_settings, BridgeSettings, SettingsError};
