//! JSON-lines host: inbound port messages on one stream, outbound messages on
//! another, and a frame tick that renders deferred DOM effects.

use std::time::Duration;

use portbridge_core::OutboundPort;
use portbridge_dom::Document;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bridge::PortBridge;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostSummary {
    pub inbound: u64,
    pub rejected: u64,
    pub outbound: u64,
    pub frames: u64,
}

/// Run until `input` reaches EOF. Invalid lines are logged and skipped. On
/// EOF one last frame is rendered and already-queued outbound messages are
/// flushed.
///
/// Outbound messages are written concurrently with inbound handling, so a
/// full outbound channel only slows the reader down.
pub async fn run_host<R, W>(
    bridge: &PortBridge,
    outbound: &mut mpsc::Receiver<OutboundPort>,
    input: R,
    output: W,
    doc: &mut dyn Document,
    frame_interval: Duration,
) -> Result<HostSummary, HostError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let input_done = CancellationToken::new();
    let reader = async {
        let result = read_loop(bridge, input, doc, frame_interval).await;
        input_done.cancel();
        result
    };
    let writer = write_loop(outbound, output, &input_done);
    let (mut summary, written) = tokio::try_join!(reader, writer)?;
    summary.outbound = written;

    tracing::info!(
        inbound = summary.inbound,
        outbound = summary.outbound,
        frames = summary.frames,
        "host input closed"
    );
    Ok(summary)
}

async fn read_loop<R: AsyncRead + Unpin>(
    bridge: &PortBridge,
    input: R,
    doc: &mut dyn Document,
    frame_interval: Duration,
) -> Result<HostSummary, HostError> {
    let mut lines = BufReader::new(input).lines();
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = HostSummary::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                summary.inbound += 1;
                if let Err(e) = bridge.handle_json(&line).await {
                    summary.rejected += 1;
                    tracing::warn!(error_kind = e.error_kind(), error = %e, "inbound message rejected");
                }
            }
            _ = ticker.tick() => {
                if bridge.pending_effects() > 0 {
                    render(bridge, doc, &mut summary);
                }
            }
        }
    }

    render(bridge, doc, &mut summary);
    Ok(summary)
}

/// Write outbound messages until input is done, then drain what is queued.
async fn write_loop<W: AsyncWrite + Unpin>(
    outbound: &mut mpsc::Receiver<OutboundPort>,
    mut output: W,
    input_done: &CancellationToken,
) -> Result<u64, HostError> {
    let mut written = 0;
    loop {
        tokio::select! {
            biased;
            port = outbound.recv() => match port {
                Some(port) => {
                    write_port(&mut output, &port).await?;
                    written += 1;
                }
                None => {
                    input_done.cancelled().await;
                    break;
                }
            },
            _ = input_done.cancelled() => break,
        }
    }
    while let Ok(port) = outbound.try_recv() {
        write_port(&mut output, &port).await?;
        written += 1;
    }
    output.flush().await?;
    Ok(written)
}
