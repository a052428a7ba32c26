use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use portbridge_dom::Page;
use portbridge_runtime::{load_settings, run_host, BridgeContext, PortBridge};
use portbridge_socket::WsConnector;
use portbridge_telemetry::{LogQuery, TelemetryGuard};
use secrecy::SecretString;
use tokio::sync::mpsc;

/// Port bridge host: reads `{ "port", "payload" }` lines on stdin and writes
/// outbound port messages to stdout.
#[derive(Debug, Parser)]
#[command(name = "portbridge", version)]
struct Args {
    /// JSON settings file, deep-merged over the defaults.
    #[arg(long, env = "PORTBRIDGE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Socket endpoint, e.g. wss://chat.example.com/socket/websocket
    #[arg(long)]
    endpoint: Option<String>,

    /// API token for the socket connection.
    #[arg(long)]
    token: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    json_logs: bool,

    /// Default log level (overridden by RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,

    /// On exit, write buffered warnings and errors here as JSON lines.
    #[arg(long, env = "PORTBRIDGE_DIAGNOSTICS")]
    diagnostics: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings =
        load_settings(args.settings.as_deref()).context("failed to load settings")?;
    if let Some(endpoint) = args.endpoint {
        settings.socket.endpoint = endpoint;
    }
    if let Some(token) = args.token {
        settings.api_token = Some(SecretString::from(token));
    }
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    settings.logging.json |= args.json_logs;

    let telemetry = portbridge_telemetry::init_telemetry(settings.telemetry_config()?)
        .context("failed to initialize logging")?;
    tracing::info!(endpoint = %settings.socket.endpoint, "starting port bridge");

    let token = settings.api_token()?;
    let connector = Arc::new(WsConnector::new(settings.socket.buffer));
    let ctx = BridgeContext::connect(&settings, token, connector);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(settings.bridge.outbound_capacity.max(1));
    let bridge = PortBridge::attach(ctx, outbound_tx);

    let mut page = Page::default();
    let host = run_host(
        &bridge,
        &mut outbound_rx,
        tokio::io::stdin(),
        tokio::io::stdout(),
        &mut page,
        settings.frame_interval(),
    );

    tokio::select! {
        result = host => {
            let summary = result.context("host loop failed")?;
            tracing::info!(?summary, "stdin closed");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl+c")?;
            tracing::info!("interrupted");
        }
    }

    bridge.shutdown().await;
    tracing::info!("port bridge stopped");

    if let Some(path) = args.diagnostics.as_deref() {
        write_diagnostics(&telemetry, path)?;
    }
    Ok(())
}

fn write_diagnostics(telemetry: &TelemetryGuard, path: &Path) -> anyhow::Result<()> {
    let Some(logs) = telemetry.logs() else {
        tracing::warn!("diagnostic buffer disabled, nothing written");
        return Ok(());
    };
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let query = LogQuery {
        min_level: Some(tracing::Level::WARN),
        limit: Some(logs.len()),
        ..Default::default()
    };
    let written = logs
        .write_json_lines(&query, BufWriter::new(file))
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(records = written, path = %path.display(), "diagnostics written");
    Ok(())
}
