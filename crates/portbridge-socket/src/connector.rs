//! Ways of opening a link: a pair of text-frame channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use portbridge_core::SocketError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One established connection. Dropping `outgoing` closes it; `incoming`
/// yields `None` once the remote side is gone.
#[derive(Debug)]
pub struct Link {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, SocketError>;
}

/// WebSocket connector over `tokio-tungstenite`.
pub struct WsConnector {
    buffer: usize,
}

impl WsConnector {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, SocketError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::channel(self.buffer);
        let (in_tx, in_rx) = mpsc::channel(self.buffer);
        let _pump = tokio::spawn(ws_pump(ws, out_rx, in_tx));

        Ok(Link {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// Copies text frames between the link channels and the socket until
/// either side goes away.
async fn ws_pump(ws: WsStream, mut out_rx: mpsc::Receiver<String>, in_tx: mpsc::Sender<String>) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                let Some(text) = out else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "websocket closed by remote");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "websocket read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

/// The server side of a link created by [`ChannelConnector`].
#[derive(Debug)]
pub struct PeerLink {
    pub url: String,
    pub from_client: mpsc::Receiver<String>,
    pub to_client: mpsc::Sender<String>,
}

/// In-process connector: every connect hands the peer end of a fresh link to
/// whoever holds the receiver returned by [`ChannelConnector::new`].
pub struct ChannelConnector {
    peers: mpsc::UnboundedSender<PeerLink>,
    buffer: usize,
}

impl ChannelConnector {
    pub fn new(buffer: usize) -> (Self, mpsc::UnboundedReceiver<PeerLink>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                buffer: buffer.max(1),
            },
            rx,
        )
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &str) -> Result<Link, SocketError> {
        let (out_tx, out_rx) = mpsc::channel(self.buffer);
        let (in_tx, in_rx) = mpsc::channel(self.buffer);
        self.peers
            .send(PeerLink {
                url: url.to_owned(),
                from_client: out_rx,
                to_client: in_tx,
            })
            .map_err(|_| SocketError::Connect("no peer accepting links".into()))?;
        Ok(Link {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
