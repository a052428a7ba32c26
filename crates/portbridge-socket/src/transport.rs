//! Authenticated transport session: one lazily opened link at a time, joined
//! to a single channel topic, with a replaceable credential.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use portbridge_core::SocketError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::connector::{Connector, Link};
use crate::frame::{PhoenixFrame, PHOENIX_TOPIC};

pub const DEFAULT_CHANNEL_TOPIC: &str = "__absinthe__:control";
const PROTOCOL_VSN: &str = "2.0.0";
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Socket endpoint without query string, e.g. `ws://host/socket/websocket`.
    pub endpoint: String,
    /// Channel joined on every new link.
    pub channel_topic: String,
    pub heartbeat_interval: Duration,
    /// Upper bound on opening a link; a connect that takes longer fails.
    pub connect_timeout: Duration,
    /// Outgoing frame buffer per link.
    pub buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:4000/socket/websocket".into(),
            channel_topic: DEFAULT_CHANNEL_TOPIC.into(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            buffer: 64,
        }
    }
}

/// What the transport reports to the session layer.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Frame(PhoenixFrame),
    Closed { link_id: u64, reason: String },
}

struct LinkHandle {
    id: u64,
    join_ref: String,
    frames_tx: mpsc::Sender<PhoenixFrame>,
    _task: JoinHandle<()>,
}

pub struct TransportSession {
    config: TransportConfig,
    token: RwLock<SecretString>,
    connector: Arc<dyn Connector>,
    refs: Arc<AtomicU64>,
    next_link: AtomicU64,
    link: Mutex<Option<LinkHandle>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportSession {
    /// Create a session. No connection is made until the first push.
    pub fn new(
        config: TransportConfig,
        token: SecretString,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            token: RwLock::new(token),
            connector,
            refs: Arc::new(AtomicU64::new(1)),
            next_link: AtomicU64::new(1),
            link: Mutex::new(None),
            events_tx,
        };
        (session, events_rx)
    }

    /// Replace the credential in place. Links opened from now on use it;
    /// the current link is left alone.
    pub fn update_token(&self, token: SecretString) {
        *self.token.write() = token;
        tracing::debug!("transport credential replaced");
    }

    pub fn token(&self) -> SecretString {
        self.token.read().clone()
    }

    pub fn channel_topic(&self) -> &str {
        &self.config.channel_topic
    }

    /// URL for the next link, carrying the current credential.
    pub fn connect_url(&self) -> String {
        let token = self.token.read();
        let encoded = utf8_percent_encode(token.expose_secret(), NON_ALPHANUMERIC);
        let sep = if self.config.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}token={encoded}&vsn={PROTOCOL_VSN}",
            self.config.endpoint
        )
    }

    pub fn next_ref(&self) -> String {
        next_ref(&self.refs)
    }

    /// Id of the open link, opening one if needed.
    pub async fn ensure_link(&self) -> Result<u64, SocketError> {
        let mut link = self.link.lock().await;
        if let Some(handle) = link.as_ref().filter(|h| !h.frames_tx.is_closed()) {
            return Ok(handle.id);
        }
        let handle = self.open_link().await?;
        let id = handle.id;
        *link = Some(handle);
        Ok(id)
    }

    /// Push `event` on the channel topic over link `link_id`. Fails with
    /// `LinkClosed` if that link is no longer the open one.
    pub async fn push(
        &self,
        link_id: u64,
        msg_ref: String,
        event: &str,
        payload: Value,
    ) -> Result<(), SocketError> {
        let (frames_tx, join_ref) = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(handle) if handle.id == link_id => {
                    (handle.frames_tx.clone(), handle.join_ref.clone())
                }
                _ => return Err(SocketError::LinkClosed),
            }
        };
        let frame = PhoenixFrame::new(
            Some(join_ref),
            Some(msg_ref),
            self.config.channel_topic.clone(),
            event,
            payload,
        );
        frames_tx
            .send(frame)
            .await
            .map_err(|_| SocketError::LinkClosed)
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.frames_tx.is_closed())
    }

    /// Close the open link, if any. Its `Closed` event follows.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.link.lock().await.take() {
            tracing::info!(link_id = handle.id, "closing transport link");
        }
    }

    async fn open_link(&self) -> Result<LinkHandle, SocketError> {
        let url = self.connect_url();
        let connect = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&url));
        let link = match connect.await {
            Ok(result) => result,
            Err(_) => Err(SocketError::Connect(format!(
                "timed out after {:?}",
                self.config.connect_timeout
            ))),
        }
        .map_err(|e| {
            tracing::warn!(endpoint = %self.config.endpoint, error = %e, "transport connect failed");
            e
        })?;

        let id = self.next_link.fetch_add(1, Ordering::Relaxed);
        let join_ref = self.next_ref();
        let join = PhoenixFrame::join(join_ref.clone(), self.config.channel_topic.clone());
        let (frames_tx, frames_rx) = mpsc::channel(self.config.buffer.max(1));

        tracing::info!(
            link_id = id,
            endpoint = %self.config.endpoint,
            topic = %self.config.channel_topic,
            "transport link opened"
        );

        let task = tokio::spawn(link_loop(
            id,
            link,
            frames_rx,
            join,
            self.events_tx.clone(),
            Arc::clone(&self.refs),
            self.config.heartbeat_interval.max(MIN_HEARTBEAT),
        ));

        Ok(LinkHandle {
            id,
            join_ref,
            frames_tx,
            _task: task,
        })
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    refs.fetch_add(1, Ordering::Relaxed).to_string()
}

async fn link_loop(
    link_id: u64,
    mut link: Link,
    mut frames_rx: mpsc::Receiver<PhoenixFrame>,
    join: PhoenixFrame,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    refs: Arc<AtomicU64>,
    heartbeat: Duration,
) {
    let reason = run_link(&mut link, &mut frames_rx, join, &events_tx, &refs, heartbeat).await;
    tracing::info!(link_id, %reason, "transport link closed");
    let _ = events_tx.send(TransportEvent::Closed { link_id, reason });
}

/// Drive one link until it ends; returns why.
async fn run_link(
    link: &mut Link,
    frames_rx: &mut mpsc::Receiver<PhoenixFrame>,
    join: PhoenixFrame,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
    refs: &AtomicU64,
    heartbeat: Duration,
) -> String {
    let mut ticker = tokio::time::interval(heartbeat);
    if link.outgoing.send(join.encode()).await.is_err() {
        return "link closed before join".into();
    }
    ticker.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            frame = frames_rx.recv() => {
                let Some(frame) = frame else {
                    return "disconnected".into();
                };
                if link.outgoing.send(frame.encode()).await.is_err() {
                    return "link closed".into();
                }
            }
            text = link.incoming.recv() => {
                let Some(text) = text else {
                    return "remote closed".into();
                };
                match PhoenixFrame::decode(&text) {
                    Ok(frame) if frame.topic == PHOENIX_TOPIC => {
                        tracing::trace!(msg_ref = ?frame.msg_ref, "heartbeat reply");
                    }
                    Ok(frame) => {
                        if events_tx.send(TransportEvent::Frame(frame)).is_err() {
                            return "session dropped".into();
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
                }
            }
            _ = ticker.tick() => {
                let beat = PhoenixFrame::heartbeat(next_ref(refs));
                if link.outgoing.send(beat.encode()).await.is_err() {
                    return "link closed".into();
                }
            }
        }
    }
}
