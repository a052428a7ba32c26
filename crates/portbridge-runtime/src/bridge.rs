//! The port bridge: routes inbound port messages to the socket session or the
//! frame queue, and relays notifier lifecycles to the outbound port channel.

use std::sync::Arc;

use parking_lot::Mutex;
use portbridge_core::{
    BridgeError, ClientId, InboundPort, OperationDocument, OutboundPort, RawToken,
};
use portbridge_dom::{run_effects, Autosize, Document, DomEffect, FrameQueue, FrameReport};
use portbridge_socket::{Notifier, NotifierEvent, NotifierEvents, SubscriptionClient};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::context::BridgeContext;

/// Socket work queued behind earlier socket work, in arrival order.
#[derive(Debug)]
enum SocketOp {
    Send(OperationDocument),
    Cancel(ClientId),
}

pub struct PortBridge {
    ctx: BridgeContext,
    outbound: mpsc::Sender<OutboundPort>,
    socket_ops: mpsc::UnboundedSender<SocketOp>,
    frames: Mutex<FrameQueue>,
    autosize: Mutex<Autosize>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl PortBridge {
    /// Wire the ports and start the socket worker. Outbound messages go to
    /// `outbound` in the order each operation produces them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(ctx: BridgeContext, outbound: mpsc::Sender<OutboundPort>) -> Self {
        let tasks = TaskTracker::new();
        let cancel = CancellationToken::new();
        let (socket_ops, ops_rx) = mpsc::unbounded_channel();
        let worker = SocketWorker {
            client: Arc::clone(&ctx.client),
            outbound: outbound.clone(),
            tasks: tasks.clone(),
            cancel: cancel.clone(),
        };
        let _ = tasks.spawn(worker.run(ops_rx).instrument(tracing::info_span!("socket_worker")));
        tracing::info!("port bridge attached");
        Self {
            ctx,
            outbound,
            socket_ops,
            frames: Mutex::new(FrameQueue::new()),
            autosize: Mutex::new(Autosize::new()),
            tasks,
            cancel,
        }
    }

    pub fn context(&self) -> &BridgeContext {
        &self.ctx
    }

    /// Parse one `{ "port", "payload" }` message and handle it.
    pub async fn handle_json(&self, text: &str) -> Result<(), BridgeError> {
        let port: InboundPort =
            serde_json::from_str(text).map_err(|e| BridgeError::InvalidMessage(e.to_string()))?;
        self.handle(port).await
    }

    /// Socket operations are queued and return immediately; only the token
    /// acknowledgement waits, and only for room in the outbound channel.
    pub async fn handle(&self, port: InboundPort) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::ShutDown);
        }
        tracing::debug!(port = port.port_name(), "inbound port message");

        match DomEffect::from_port(port) {
            Ok(effect) => {
                self.frames.lock().schedule(effect);
                Ok(())
            }
            Err(InboundPort::UpdateToken(token)) => self.update_token(token).await,
            Err(InboundPort::SendSocket(document)) => self.queue(SocketOp::Send(document)),
            Err(InboundPort::CancelSocket(client_id)) => self.queue(SocketOp::Cancel(client_id)),
            Err(other) => Err(BridgeError::InvalidMessage(format!(
                "unroutable port {}",
                other.port_name()
            ))),
        }
    }

    fn queue(&self, op: SocketOp) -> Result<(), BridgeError> {
        self.socket_ops.send(op).map_err(|_| BridgeError::ShutDown)
    }

    async fn update_token(&self, token: RawToken) -> Result<(), BridgeError> {
        self.ctx.transport.update_token(token.into_secret());
        tracing::info!("socket token updated");
        self.outbound
            .send(OutboundPort::SocketTokenUpdated)
            .await
            .map_err(|_| BridgeError::OutboundClosed)
    }

    /// Run one frame against `doc`: apply every effect queued before the call.
    pub fn render_frame(&self, doc: &mut dyn Document) -> FrameReport {
        let batch = self.frames.lock().take_frame();
        if batch.is_empty() {
            return FrameReport::default();
        }
        let mut autosize = self.autosize.lock();
        run_effects(batch, doc, &mut autosize)
    }

    /// Forward a user input event on `id` to the autosize registry.
    pub fn on_input(&self, doc: &mut dyn Document, id: &str) -> bool {
        self.autosize.lock().on_input(doc, id)
    }

    pub fn pending_effects(&self) -> usize {
        self.frames.lock().len()
    }

    /// Stop the socket worker and all forwarders, then close the session.
    /// Socket work still queued or connecting is dropped.
    pub async fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!(tasks = self.tasks.len(), "port bridge shutting down");
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.ctx.client.shutdown().await;
    }
}

/// Runs queued socket operations one at a time, so a cancel never overtakes
/// the send it targets. Each submitted operation gets its own forwarder.
struct SocketWorker {
    client: Arc<dyn SubscriptionClient>,
    outbound: mpsc::Sender<OutboundPort>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl SocketWorker {
    async fn run(self, mut ops: mpsc::UnboundedReceiver<SocketOp>) {
        loop {
            let op = tokio::select! {
                _ = self.cancel.cancelled() => break,
                op = ops.recv() => op,
            };
            let Some(op) = op else { break };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.execute(op) => {}
            }
        }
        tracing::debug!("socket worker stopped");
    }

    async fn execute(&self, op: SocketOp) {
        match op {
            SocketOp::Send(document) => self.send_socket(document).await,
            SocketOp::Cancel(client_id) => self.cancel_socket(&client_id).await,
        }
    }

    async fn send_socket(&self, document: OperationDocument) {
        let client_id = document.client_id().clone();
        match self.client.send(document).await {
            Ok((notifier, events)) => {
                let span = tracing::info_span!(
                    "operation",
                    client_id = %notifier.client_id(),
                    notifier_id = %notifier.id
                );
                let forwarder = forward(events, self.outbound.clone(), self.cancel.clone());
                let _ = self.tasks.spawn(forwarder.instrument(span));
            }
            Err(e) => {
                tracing::warn!(
                    %client_id,
                    error_kind = e.error_kind(),
                    error = %e,
                    "operation not submitted"
                );
                let port = OutboundPort::SocketError(json!({
                    "clientId": client_id,
                    "message": e.to_string(),
                }));
                if self.outbound.send(port).await.is_err() {
                    tracing::debug!("outbound closed, dropping socket error");
                }
            }
        }
    }

    async fn cancel_socket(&self, client_id: &ClientId) {
        let matching: Vec<Notifier> = self
            .client
            .notifiers()
            .into_iter()
            .filter(|notifier| notifier.client_id() == client_id)
            .collect();

        for notifier in &matching {
            tracing::info!(%client_id, notifier_id = %notifier.id, "cancelling operation");
            if let Err(e) = self.client.cancel(notifier).await {
                tracing::warn!(
                    %client_id,
                    error_kind = e.error_kind(),
                    error = %e,
                    "cancel failed"
                );
            }
        }
    }
}

/// Relay one notifier's lifecycle until it ends or the bridge shuts down.
async fn forward(
    mut events: NotifierEvents,
    outbound: mpsc::Sender<OutboundPort>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };
        tracing::info!(event = event.name(), payload = %event.data(), "socket event");

        let port = match event {
            NotifierEvent::Start(data) => OutboundPort::SocketStart(data),
            NotifierEvent::Result(data) => OutboundPort::SocketResult(data),
            NotifierEvent::Error(data) => OutboundPort::SocketError(data),
            NotifierEvent::Abort(data) => OutboundPort::SocketAbort(data),
            NotifierEvent::Cancel(_) => continue,
        };
        if outbound.send(port).await.is_err() {
            tracing::debug!("outbound closed, stopping forwarder");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use portbridge_core::{NotifierId, SocketError};
    use portbridge_dom::{NodeRef, Page};
    use portbridge_socket::{ChannelConnector, TransportConfig, TransportSession};
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::Value;
    use std::time::Duration;

    /// Records calls and lets tests drive notifier events by hand.
    #[derive(Default)]
    struct FakeClient {
        tracked: Mutex<Vec<(Notifier, mpsc::UnboundedSender<NotifierEvent>)>>,
        cancelled: Mutex<Vec<NotifierId>>,
        fail_with: Mutex<Option<SocketError>>,
        /// Never finish `send`, like a connect that hangs.
        stalled: Mutex<bool>,
    }

    impl FakeClient {
        fn emit(&self, client_id: &str, event: NotifierEvent) {
            for (notifier, tx) in self.tracked.lock().iter() {
                if notifier.client_id().as_str() == client_id {
                    let _ = tx.send(event.clone());
                }
            }
        }

        fn cancelled(&self) -> usize {
            self.cancelled.lock().len()
        }
    }

    #[async_trait]
    impl SubscriptionClient for FakeClient {
        async fn send(
            &self,
            document: OperationDocument,
        ) -> Result<(Notifier, NotifierEvents), SocketError> {
            if let Some(e) = self.fail_with.lock().clone() {
                return Err(e);
            }
            let stalled = *self.stalled.lock();
            if stalled {
                std::future::pending::<()>().await;
            }
            let notifier = Notifier::new(document);
            let (tx, rx) = mpsc::unbounded_channel();
            self.tracked.lock().push((notifier.clone(), tx));
            Ok((notifier, rx))
        }

        fn notifiers(&self) -> Vec<Notifier> {
            self.tracked.lock().iter().map(|(n, _)| n.clone()).collect()
        }

        async fn cancel(&self, notifier: &Notifier) -> Result<(), SocketError> {
            let mut tracked = self.tracked.lock();
            if let Some(idx) = tracked.iter().position(|(n, _)| n.id == notifier.id) {
                let (n, tx) = tracked.remove(idx);
                let _ = tx.send(NotifierEvent::Cancel(n.snapshot()));
                self.cancelled.lock().push(n.id);
            }
            Ok(())
        }
    }

    fn bridge() -> (PortBridge, Arc<FakeClient>, mpsc::Receiver<OutboundPort>) {
        let (connector, _peers) = ChannelConnector::new(4);
        let (transport, _events) = TransportSession::new(
            TransportConfig::default(),
            SecretString::from("initial"),
            Arc::new(connector),
        );
        let client = Arc::new(FakeClient::default());
        let ctx = BridgeContext::new(Arc::new(transport), client.clone());
        let (tx, rx) = mpsc::channel(32);
        (PortBridge::attach(ctx, tx), client, rx)
    }

    fn send_socket(client_id: &str) -> InboundPort {
        InboundPort::SendSocket(OperationDocument::new(
            "subscription { messages { id } }",
            ClientId::from_raw(client_id),
        ))
    }

    async fn recv(rx: &mut mpsc::Receiver<OutboundPort>) -> OutboundPort {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("outbound timeout")
            .expect("outbound closed")
    }

    async fn settle(done: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("socket worker did not catch up");
    }

    async fn assert_quiet(rx: &mut mpsc::Receiver<OutboundPort>) {
        let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(extra.is_err(), "unexpected outbound message: {extra:?}");
    }

    #[tokio::test]
    async fn update_token_replaces_credential_and_acks_once() {
        let (bridge, _client, mut rx) = bridge();
        bridge
            .handle(InboundPort::UpdateToken(RawToken::new("rotated")))
            .await
            .unwrap();

        assert_eq!(bridge.context().transport.token().expose_secret(), "rotated");
        assert_eq!(recv(&mut rx).await, OutboundPort::SocketTokenUpdated);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn send_socket_registers_one_notifier_and_relays_result() {
        let (bridge, client, mut rx) = bridge();
        bridge.handle(send_socket("feed")).await.unwrap();
        settle(|| !client.notifiers().is_empty()).await;

        let tracked = client.notifiers();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].client_id().as_str(), "feed");

        let data = json!({ "data": { "messages": [{ "id": "m1" }] } });
        client.emit("feed", NotifierEvent::Result(data.clone()));
        assert_eq!(recv(&mut rx).await, OutboundPort::SocketResult(data));
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn lifecycle_events_map_to_ports() {
        let (bridge, client, mut rx) = bridge();
        bridge.handle(send_socket("feed")).await.unwrap();
        settle(|| !client.notifiers().is_empty()).await;

        client.emit("feed", NotifierEvent::Start(json!({ "id": "ntf_1" })));
        client.emit("feed", NotifierEvent::Error(json!({ "errors": [] })));
        client.emit(
            "feed",
            NotifierEvent::Abort(json!({ "clientId": "feed", "reason": "remote closed" })),
        );

        assert_matches!(recv(&mut rx).await, OutboundPort::SocketStart(v) if v["id"] == "ntf_1");
        assert_matches!(recv(&mut rx).await, OutboundPort::SocketError(_));
        assert_matches!(
            recv(&mut rx).await,
            OutboundPort::SocketAbort(v) if v["reason"] == "remote closed"
        );
    }

    #[tokio::test]
    async fn submission_failure_becomes_socket_error() {
        let (bridge, client, mut rx) = bridge();
        *client.fail_with.lock() = Some(SocketError::Connect("refused".into()));

        bridge.handle(send_socket("feed")).await.unwrap();
        assert_matches!(
            recv(&mut rx).await,
            OutboundPort::SocketError(v)
                if v["clientId"] == "feed" && v["message"] == "connect failed: refused"
        );
        assert!(client.notifiers().is_empty());
    }

    #[tokio::test]
    async fn cancel_with_no_match_is_silent() {
        let (bridge, client, mut rx) = bridge();
        bridge.handle(send_socket("feed")).await.unwrap();
        settle(|| !client.notifiers().is_empty()).await;

        bridge
            .handle(InboundPort::CancelSocket(ClientId::from_raw("other")))
            .await
            .unwrap();
        assert_quiet(&mut rx).await;
        assert_eq!(client.cancelled(), 0);
        assert_eq!(client.notifiers().len(), 1);
    }

    #[tokio::test]
    async fn cancel_hits_every_match_and_nothing_else() {
        let (bridge, client, mut rx) = bridge();
        for id in ["feed", "typing", "feed"] {
            bridge.handle(send_socket(id)).await.unwrap();
        }

        bridge
            .handle(InboundPort::CancelSocket(ClientId::from_raw("feed")))
            .await
            .unwrap();
        settle(|| client.cancelled() == 2).await;
        let left = client.notifiers();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].client_id().as_str(), "typing");
        // cancellation itself is not reported outbound
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn dom_ports_wait_for_a_frame() {
        let (bridge, _client, _rx) = bridge();
        let mut page = Page::default().with_block("thread", 0.0, 200.0, 900.0);
        bridge
            .handle_json(r#"{"port":"scrollToBottom","payload":{"containerId":"thread"}}"#)
            .await
            .unwrap();

        assert_eq!(bridge.pending_effects(), 1);
        assert_eq!(page.scroll_top(&NodeRef::Element("thread".into())), 0.0);

        let report = bridge.render_frame(&mut page);
        assert_eq!(report.applied, 1);
        assert_eq!(page.scroll_top(&NodeRef::Element("thread".into())), 700.0);
        assert_eq!(bridge.pending_effects(), 0);
    }

    #[tokio::test]
    async fn scroll_to_document_missing_anchor_leaves_page_alone() {
        let (bridge, _client, _rx) = bridge();
        let mut page = Page::new(600.0, 2000.0);
        page.set_scroll_top(&NodeRef::Root, 120.0);
        bridge
            .handle_json(r#"{"port":"scrollTo","payload":{"containerId":"DOCUMENT","anchorId":"nope","offset":10}}"#)
            .await
            .unwrap();
        let report = bridge.render_frame(&mut page);
        assert!(report.is_clean());
        assert_eq!(page.root_scroll_top(), 120.0);
    }

    #[tokio::test]
    async fn autosize_destroy_then_input_keeps_height() {
        let (bridge, _client, _rx) = bridge();
        let mut page = Page::default().with_textarea("composer", 0.0, "hi");
        for method in ["create", "destroy"] {
            let msg = format!(r#"{{"port":"autosize","payload":{{"method":"{method}","id":"composer"}}}}"#);
            bridge.handle_json(&msg).await.unwrap();
        }
        bridge.render_frame(&mut page);
        let height = page.element("composer").unwrap().height;

        page.set_value("composer", "line\nline\nline\nline");
        assert!(!bridge.on_input(&mut page, "composer"));
        assert_eq!(page.element("composer").unwrap().height, height);
    }

    #[tokio::test]
    async fn select_covers_whole_value() {
        let (bridge, _client, _rx) = bridge();
        let mut page = Page::default().with_input("rename", 0.0, "Project Apollo");
        bridge
            .handle(InboundPort::Select("rename".into()))
            .await
            .unwrap();
        bridge.render_frame(&mut page);
        assert_eq!(page.focused(), Some("rename"));
        assert_eq!(page.element("rename").unwrap().selection, Some((0, 14)));
    }

    #[tokio::test]
    async fn missing_select_target_is_reported_not_fatal() {
        let (bridge, _client, _rx) = bridge();
        let mut page = Page::default().with_block("thread", 0.0, 100.0, 300.0);
        bridge.handle(InboundPort::Select("ghost".into())).await.unwrap();
        bridge
            .handle_json(r#"{"port":"scrollToBottom","payload":{"containerId":"thread"}}"#)
            .await
            .unwrap();

        let report = bridge.render_frame(&mut page);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.applied, 1);
        assert_eq!(page.element("thread").unwrap().scroll_top, 200.0);
    }

    #[tokio::test]
    async fn stalled_send_does_not_hold_up_other_ports() {
        let (bridge, client, mut rx) = bridge();
        *client.stalled.lock() = true;
        let mut page = Page::default().with_block("thread", 0.0, 100.0, 450.0);

        let inbound = async {
            bridge.handle(send_socket("feed")).await.unwrap();
            bridge
                .handle(InboundPort::CancelSocket(ClientId::from_raw("feed")))
                .await
                .unwrap();
            bridge
                .handle_json(r#"{"port":"scrollToBottom","payload":{"containerId":"thread"}}"#)
                .await
                .unwrap();
            bridge
                .handle(InboundPort::UpdateToken(RawToken::new("rotated")))
                .await
                .unwrap();
        };
        tokio::time::timeout(Duration::from_millis(500), inbound)
            .await
            .expect("inbound handling blocked on the socket");

        assert_eq!(recv(&mut rx).await, OutboundPort::SocketTokenUpdated);
        bridge.render_frame(&mut page);
        assert_eq!(page.element("thread").unwrap().scroll_top, 350.0);
        assert!(client.notifiers().is_empty());

        tokio::time::timeout(Duration::from_secs(1), bridge.shutdown())
            .await
            .expect("shutdown waited on the stalled send");
    }

    #[tokio::test]
    async fn cancel_right_after_send_still_applies() {
        let (bridge, client, mut rx) = bridge();
        bridge.handle(send_socket("feed")).await.unwrap();
        bridge
            .handle(InboundPort::CancelSocket(ClientId::from_raw("feed")))
            .await
            .unwrap();

        settle(|| client.cancelled() == 1).await;
        assert!(client.notifiers().is_empty());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn malformed_message_is_invalid() {
        let (bridge, _client, _rx) = bridge();
        let result = bridge.handle_json(r#"{"port":"launchRockets","payload":1}"#).await;
        assert_matches!(result, Err(BridgeError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn shutdown_stops_forwarders_and_rejects_input() {
        let (bridge, client, mut rx) = bridge();
        bridge.handle(send_socket("feed")).await.unwrap();
        settle(|| !client.notifiers().is_empty()).await;
        bridge.shutdown().await;

        client.emit("feed", NotifierEvent::Result(Value::Null));
        assert_quiet(&mut rx).await;
        assert_matches!(
            bridge.handle(send_socket("late")).await,
            Err(BridgeError::ShutDown)
        );
    }
}
