mod buffer;

pub use buffer::{LogBuffer, LogBufferLayer, LogQuery, LogRecord};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "portbridge_socket" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of compact text.
    pub json: bool,
    /// Records kept in the in-memory diagnostic buffer. 0 disables it.
    pub buffer_capacity: usize,
    /// Least severe level copied into the buffer.
    pub buffer_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            buffer_capacity: 512,
            buffer_level: Level::INFO,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Handle to the installed subscriber. Keep it alive for the process lifetime.
pub struct TelemetryGuard {
    log_buffer: Option<Arc<LogBuffer>>,
}

impl TelemetryGuard {
    /// Recent diagnostic records, if the buffer is enabled.
    pub fn logs(&self) -> Option<&LogBuffer> {
        self.log_buffer.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
///
/// Formatted output goes to stderr; stdout is reserved for port traffic.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let compact_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let log_buffer =
        (config.buffer_capacity > 0).then(|| Arc::new(LogBuffer::new(config.buffer_capacity)));
    let buffer_layer = log_buffer
        .as_ref()
        .map(|buffer| LogBufferLayer::new(Arc::clone(buffer), config.buffer_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(compact_layer)
        .with(buffer_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(TelemetryGuard { log_buffer })
}

/// Build an `EnvFilter` directive string from a base level and overrides.
pub fn filter_directives(base: Level, module_levels: &[(String, Level)]) -> String {
    let mut out = base.to_string().to_lowercase();
    for (module, level) in module_levels {
        out.push(',');
        out.push_str(module);
        out.push('=');
        out.push_str(&level.to_string().to_lowercase());
    }
    out
}
