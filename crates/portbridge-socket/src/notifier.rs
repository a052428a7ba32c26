use std::sync::Arc;

use async_trait::async_trait;
use portbridge_core::{ClientId, NotifierId, OperationDocument, SocketError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Handle for one in-flight operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notifier {
    pub id: NotifierId,
    pub request: Arc<OperationDocument>,
    /// Server-assigned once a subscription is acknowledged.
    pub subscription_id: Option<String>,
}

impl Notifier {
    pub fn new(request: OperationDocument) -> Self {
        Self {
            id: NotifierId::new(),
            request: Arc::new(request),
            subscription_id: None,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        self.request.client_id()
    }

    /// JSON view handed to the application with lifecycle events.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Lifecycle of a notifier. `Result` may repeat for subscriptions; `Error`,
/// `Abort` and `Cancel` are terminal.
#[derive(Clone, Debug, PartialEq)]
pub enum NotifierEvent {
    Start(Value),
    Result(Value),
    Error(Value),
    Abort(Value),
    Cancel(Value),
}

impl NotifierEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Result(_) => "result",
            Self::Error(_) => "error",
            Self::Abort(_) => "abort",
            Self::Cancel(_) => "cancel",
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            Self::Start(v) | Self::Result(v) | Self::Error(v) | Self::Abort(v) | Self::Cancel(v) => v,
        }
    }

    pub fn into_data(self) -> Value {
        match self {
            Self::Start(v) | Self::Result(v) | Self::Error(v) | Self::Abort(v) | Self::Cancel(v) => v,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Abort(_) | Self::Cancel(_))
    }
}

/// Events of one notifier; ends when the operation completes or is dropped.
pub type NotifierEvents = mpsc::UnboundedReceiver<NotifierEvent>;

/// A session that multiplexes operations over one transport.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    /// Submit a document. Every call registers exactly one notifier.
    async fn send(
        &self,
        document: OperationDocument,
    ) -> Result<(Notifier, NotifierEvents), SocketError>;

    /// Snapshot of tracked notifiers in submission order.
    fn notifiers(&self) -> Vec<Notifier>;

    /// Stop tracking `notifier` and tell the server. Unknown notifiers are ignored.
    async fn cancel(&self, notifier: &Notifier) -> Result<(), SocketError>;

    /// Abort whatever is still in flight and release the connection.
    async fn shutdown(&self) {}
}
