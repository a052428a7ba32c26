//! Absinthe subscription session: multiplexes operation documents over one
//! transport and routes replies and subscription data to their notifiers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use portbridge_core::{OperationDocument, SocketError};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::frame::{
    PhoenixFrame, EVENT_CLOSE, EVENT_DOC, EVENT_ERROR, EVENT_REPLY, EVENT_SUBSCRIPTION_DATA,
    EVENT_UNSUBSCRIBE,
};
use crate::notifier::{Notifier, NotifierEvent, NotifierEvents, SubscriptionClient};
use crate::transport::{TransportEvent, TransportSession};

struct Entry {
    notifier: Notifier,
    push_ref: String,
    link_id: u64,
    events: mpsc::UnboundedSender<NotifierEvent>,
}

impl Entry {
    fn emit(&self, event: NotifierEvent) {
        // Receiver gone means nobody is listening; the entry still completes normally.
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    /// Push refs cancelled before their reply arrived, with the link they went out on.
    cancelled: HashMap<String, u64>,
}

/// Unsubscribe to send after the registry lock is released.
struct Unsubscribe {
    link_id: u64,
    subscription_id: String,
}

pub struct AbsintheSession {
    transport: Arc<TransportSession>,
    registry: Arc<Mutex<Registry>>,
    router: JoinHandle<()>,
}

impl AbsintheSession {
    /// Wrap `transport`; `events` must be the receiver returned alongside it.
    pub fn new(
        transport: Arc<TransportSession>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let router = tokio::spawn(route_events(
            Arc::clone(&transport),
            Arc::clone(&registry),
            events,
        ));
        Self {
            transport,
            registry,
            router,
        }
    }

    pub fn transport(&self) -> &Arc<TransportSession> {
        &self.transport
    }
}

impl Drop for AbsintheSession {
    fn drop(&mut self) {
        self.router.abort();
    }
}

#[async_trait]
impl SubscriptionClient for AbsintheSession {
    async fn send(
        &self,
        document: OperationDocument,
    ) -> Result<(Notifier, NotifierEvents), SocketError> {
        let payload = document.push_payload();
        let notifier = Notifier::new(document);
        let link_id = self.transport.ensure_link().await?;
        let push_ref = self.transport.next_ref();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.registry.lock().entries.push(Entry {
            notifier: notifier.clone(),
            push_ref: push_ref.clone(),
            link_id,
            events: events_tx,
        });
        tracing::debug!(
            notifier_id = %notifier.id,
            client_id = %notifier.client_id(),
            push_ref = %push_ref,
            "pushing operation document"
        );

        if let Err(e) = self
            .transport
            .push(link_id, push_ref.clone(), EVENT_DOC, payload)
            .await
        {
            self.registry
                .lock()
                .entries
                .retain(|entry| entry.push_ref != push_ref);
            return Err(e);
        }
        Ok((notifier, events_rx))
    }

    fn notifiers(&self) -> Vec<Notifier> {
        self.registry
            .lock()
            .entries
            .iter()
            .map(|entry| entry.notifier.clone())
            .collect()
    }

    async fn cancel(&self, notifier: &Notifier) -> Result<(), SocketError> {
        let unsubscribe = {
            let mut registry = self.registry.lock();
            let Some(idx) = registry
                .entries
                .iter()
                .position(|entry| entry.notifier.id == notifier.id)
            else {
                return Ok(());
            };
            let entry = registry.entries.remove(idx);
            entry.emit(NotifierEvent::Cancel(entry.notifier.snapshot()));
            match entry.notifier.subscription_id {
                Some(subscription_id) => Some(Unsubscribe {
                    link_id: entry.link_id,
                    subscription_id,
                }),
                None => {
                    registry.cancelled.insert(entry.push_ref, entry.link_id);
                    None
                }
            }
        };

        match unsubscribe {
            Some(unsubscribe) => send_unsubscribe(&self.transport, unsubscribe).await,
            None => Ok(()),
        }
    }

    async fn shutdown(&self) {
        self.router.abort();
        abort_where(&mut self.registry.lock(), None, "session shut down");
        self.transport.disconnect().await;
    }
}

async fn send_unsubscribe(
    transport: &TransportSession,
    unsubscribe: Unsubscribe,
) -> Result<(), SocketError> {
    tracing::debug!(subscription_id = %unsubscribe.subscription_id, "unsubscribing");
    transport
        .push(
            unsubscribe.link_id,
            transport.next_ref(),
            EVENT_UNSUBSCRIBE,
            json!({ "subscriptionId": unsubscribe.subscription_id }),
        )
        .await
}

async fn route_events(
    transport: Arc<TransportSession>,
    registry: Arc<Mutex<Registry>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Frame(frame) => {
                let unsubscribe = {
                    let mut registry = registry.lock();
                    handle_frame(&mut registry, transport.channel_topic(), frame)
                };
                if let Some(unsubscribe) = unsubscribe {
                    if let Err(e) = send_unsubscribe(&transport, unsubscribe).await {
                        tracing::debug!(error = %e, "late unsubscribe not sent");
                    }
                }
            }
            TransportEvent::Closed { link_id, reason } => {
                let mut registry = registry.lock();
                abort_where(&mut registry, Some(link_id), &reason);
            }
        }
    }
}

fn handle_frame(
    registry: &mut Registry,
    channel_topic: &str,
    frame: PhoenixFrame,
) -> Option<Unsubscribe> {
    match frame.event.as_str() {
        EVENT_REPLY if frame.topic == channel_topic => handle_reply(registry, frame),
        EVENT_SUBSCRIPTION_DATA => {
            let Some(entry) = registry.entries.iter().find(|entry| {
                entry.notifier.subscription_id.as_deref() == Some(frame.topic.as_str())
            }) else {
                tracing::debug!(topic = %frame.topic, "data for unknown subscription");
                return None;
            };
            let result = frame.payload.get("result").cloned().unwrap_or(Value::Null);
            entry.emit(NotifierEvent::Result(result));
            None
        }
        EVENT_ERROR | EVENT_CLOSE if frame.topic == channel_topic => {
            let reason = format!("channel {}", frame.event);
            abort_where(registry, None, &reason);
            None
        }
        _ => {
            tracing::trace!(topic = %frame.topic, event = %frame.event, "ignoring frame");
            None
        }
    }
}

fn handle_reply(registry: &mut Registry, frame: PhoenixFrame) -> Option<Unsubscribe> {
    let msg_ref = frame.msg_ref.clone().unwrap_or_default();
    let ok = frame.reply_status() == Some("ok");
    let response = frame.reply_response();
    let subscription_id = response
        .get("subscriptionId")
        .and_then(Value::as_str)
        .map(str::to_owned);

    if let Some(link_id) = registry.cancelled.remove(&msg_ref) {
        return match subscription_id {
            Some(subscription_id) if ok => Some(Unsubscribe {
                link_id,
                subscription_id,
            }),
            _ => None,
        };
    }

    let Some(idx) = registry.entries.iter().position(|e| e.push_ref == msg_ref) else {
        let is_join = frame.join_ref.is_some() && frame.join_ref == frame.msg_ref;
        if ok {
            tracing::trace!(msg_ref = %msg_ref, "reply without pending push");
        } else if is_join {
            tracing::warn!(status = ?frame.reply_status(), "channel join rejected");
            abort_where(registry, None, "channel join rejected");
        } else {
            tracing::warn!(msg_ref = %msg_ref, status = ?frame.reply_status(), "error reply for unknown push");
        }
        return None;
    };

    match (ok, subscription_id) {
        (true, Some(subscription_id)) => {
            let entry = &mut registry.entries[idx];
            entry.notifier.subscription_id = Some(subscription_id);
            entry.emit(NotifierEvent::Start(entry.notifier.snapshot()));
        }
        (true, None) => {
            let entry = registry.entries.remove(idx);
            entry.emit(NotifierEvent::Start(entry.notifier.snapshot()));
            entry.emit(NotifierEvent::Result(response));
        }
        (false, _) => {
            let entry = registry.entries.remove(idx);
            entry.emit(NotifierEvent::Error(response));
        }
    }
    None
}

/// Abort every entry on `link_id`, or all entries when `None`.
fn abort_where(registry: &mut Registry, link_id: Option<u64>, reason: &str) {
    let (aborted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut registry.entries)
        .into_iter()
        .partition(|entry| link_id.map_or(true, |id| entry.link_id == id));
    registry.entries = kept;
    registry
        .cancelled
        .retain(|_, cancelled_link| link_id.is_some_and(|id| *cancelled_link != id));

    for entry in aborted {
        tracing::info!(
            notifier_id = %entry.notifier.id,
            client_id = %entry.notifier.client_id(),
            %reason,
            "aborting in-flight operation"
        );
        entry.emit(NotifierEvent::Abort(json!({
            "clientId": entry.notifier.client_id(),
            "reason": reason,
        })));
    }
}
