use std::sync::Arc;

use portbridge_socket::{AbsintheSession, Connector, SubscriptionClient, TransportSession};
use secrecy::SecretString;

use crate::settings::BridgeSettings;

/// Long-lived socket state owned by the bridge from attachment to shutdown.
#[derive(Clone)]
pub struct BridgeContext {
    pub transport: Arc<TransportSession>,
    pub client: Arc<dyn SubscriptionClient>,
}

impl BridgeContext {
    pub fn new(transport: Arc<TransportSession>, client: Arc<dyn SubscriptionClient>) -> Self {
        Self { transport, client }
    }

    /// Build the transport and an Absinthe session over it. Must run inside a
    /// tokio runtime; nothing connects until the first operation.
    pub fn connect(
        settings: &BridgeSettings,
        token: SecretString,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (transport, events) =
            TransportSession::new(settings.transport_config(), token, connector);
        let transport = Arc::new(transport);
        let session = AbsintheSession::new(Arc::clone(&transport), events);
        tracing::info!(
            endpoint = %settings.socket.endpoint,
            topic = %settings.socket.channel_topic,
            "socket context created"
        );
        Self::new(transport, Arc::new(session))
    }
}
