//! End-to-end run of the subscription session against a local WebSocket server
//! speaking the Phoenix v2 / Absinthe protocol.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use portbridge_core::{ClientId, OperationDocument};
use portbridge_socket::{
    AbsintheSession, NotifierEvent, NotifierEvents, PhoenixFrame, SubscriptionClient, TransportConfig,
    TransportSession, WsConnector,
};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const SUB_ID: &str = "__absinthe__:doc:-1:AAAA";

async fn serve_one(listener: TcpListener, uri_tx: oneshot::Sender<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = uri_tx.send(req.uri().to_string());
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let frame = PhoenixFrame::decode(text.as_str()).unwrap();
        let reply = |response: serde_json::Value| {
            PhoenixFrame::new(
                frame.join_ref.clone(),
                frame.msg_ref.clone(),
                frame.topic.clone(),
                "phx_reply",
                json!({ "status": "ok", "response": response }),
            )
            .encode()
        };
        match frame.event.as_str() {
            "phx_join" => {
                ws.send(Message::Text(reply(json!({})).into())).await.unwrap();
            }
            "doc" => {
                ws.send(Message::Text(reply(json!({ "subscriptionId": SUB_ID })).into()))
                    .await
                    .unwrap();
                let data = PhoenixFrame::new(
                    None,
                    None,
                    SUB_ID,
                    "subscription:data",
                    json!({ "result": { "data": { "tick": 1 } }, "subscriptionId": SUB_ID }),
                );
                ws.send(Message::Text(data.encode().into())).await.unwrap();
            }
            _ => {}
        }
    }
}

async fn recv(events: &mut NotifierEvents) -> NotifierEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timeout")
        .expect("stream ended")
}

#[tokio::test]
async fn subscription_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let server = tokio::spawn(serve_one(listener, uri_tx));

    let config = TransportConfig {
        endpoint: format!("ws://{addr}/socket/websocket"),
        ..Default::default()
    };
    let (transport, events) = TransportSession::new(
        config,
        SecretString::from("s3cret token"),
        Arc::new(WsConnector::default()),
    );
    let session = AbsintheSession::new(Arc::new(transport), events);

    let document = OperationDocument::new("subscription { tick }", ClientId::from_raw("ticker"));
    let (_notifier, mut events) = session.send(document).await.unwrap();

    let uri = uri_rx.await.unwrap();
    assert_eq!(uri, "/socket/websocket?token=s3cret%20token&vsn=2.0.0");

    let start = recv(&mut events).await;
    assert_eq!(start.name(), "start");
    assert_eq!(start.data()["subscriptionId"], SUB_ID);
    assert_eq!(start.data()["request"]["clientId"], "ticker");

    let result = recv(&mut events).await;
    assert_eq!(result, NotifierEvent::Result(json!({ "data": { "tick": 1 } })));

    session.shutdown().await;
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}
