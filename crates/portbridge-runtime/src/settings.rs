//! Layered bridge settings.
//!
//! Sources, lowest priority first:
//! 1. compiled defaults ([`BridgeSettings::default`])
//! 2. an optional JSON file, deep-merged over the defaults
//! 3. `PORTBRIDGE_*` environment variables
//! 4. command-line flags, applied by the binary

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use portbridge_socket::{TransportConfig, DEFAULT_CHANNEL_TOPIC};
use portbridge_telemetry::TelemetryConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("unknown log level: {0}")]
    InvalidLevel(String),

    #[error("no api token configured (set PORTBRIDGE_API_TOKEN or pass --token)")]
    MissingToken,
}

impl SettingsError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Parse(_) => "parse",
            Self::InvalidEnv { .. } => "invalid_env",
            Self::InvalidLevel(_) => "invalid_level",
            Self::MissingToken => "missing_token",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    pub socket: SocketSettings,
    pub bridge: BridgeTuning,
    pub logging: LoggingSettings,
    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_token: Option<SecretString>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketSettings {
    pub endpoint: String,
    pub heartbeat_secs: u64,
    pub connect_timeout_secs: u64,
    pub channel_topic: String,
    pub buffer: usize,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:4000/socket/websocket".into(),
            heartbeat_secs: 30,
            connect_timeout_secs: 10,
            channel_topic: DEFAULT_CHANNEL_TOPIC.into(),
            buffer: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeTuning {
    /// Capacity of the outbound port channel.
    pub outbound_capacity: usize,
    /// Host frame tick.
    pub frame_interval_ms: u64,
}

impl Default for BridgeTuning {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub buffer_capacity: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            buffer_capacity: 512,
        }
    }
}

impl BridgeSettings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.socket.endpoint.clone(),
            channel_topic: self.socket.channel_topic.clone(),
            heartbeat_interval: Duration::from_secs(self.socket.heartbeat_secs),
            connect_timeout: Duration::from_secs(self.socket.connect_timeout_secs.max(1)),
            buffer: self.socket.buffer,
        }
    }

    pub fn telemetry_config(&self) -> Result<TelemetryConfig, SettingsError> {
        let log_level = Level::from_str(&self.logging.level)
            .map_err(|_| SettingsError::InvalidLevel(self.logging.level.clone()))?;
        Ok(TelemetryConfig {
            log_level,
            json: self.logging.json,
            buffer_capacity: self.logging.buffer_capacity,
            ..Default::default()
        })
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.bridge.frame_interval_ms.max(1))
    }

    pub fn api_token(&self) -> Result<SecretString, SettingsError> {
        self.api_token.clone().ok_or(SettingsError::MissingToken)
    }

    /// Apply `PORTBRIDGE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PORTBRIDGE_ENDPOINT") {
            self.socket.endpoint = v;
        }
        if let Some(v) = lookup("PORTBRIDGE_HEARTBEAT_SECS") {
            self.socket.heartbeat_secs = parse_env("PORTBRIDGE_HEARTBEAT_SECS", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_CONNECT_TIMEOUT_SECS") {
            self.socket.connect_timeout_secs = parse_env("PORTBRIDGE_CONNECT_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_CHANNEL_TOPIC") {
            self.socket.channel_topic = v;
        }
        if let Some(v) = lookup("PORTBRIDGE_OUTBOUND_CAPACITY") {
            self.bridge.outbound_capacity = parse_env("PORTBRIDGE_OUTBOUND_CAPACITY", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_FRAME_INTERVAL_MS") {
            self.bridge.frame_interval_ms = parse_env("PORTBRIDGE_FRAME_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("PORTBRIDGE_JSON_LOGS") {
            self.logging.json = parse_env("PORTBRIDGE_JSON_LOGS", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_LOG_BUFFER") {
            self.logging.buffer_capacity = parse_env("PORTBRIDGE_LOG_BUFFER", v)?;
        }
        if let Some(v) = lookup("PORTBRIDGE_API_TOKEN") {
            self.api_token = Some(SecretString::from(v));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: String) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv { key, value })
}

/// Load defaults, merge `path` if given, then apply process env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<BridgeSettings, SettingsError> {
    let mut settings = match path {
        Some(path) => load_settings_from_path(path)?,
        None => BridgeSettings::default(),
    };
    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Defaults with the JSON file at `path` deep-merged over them. No env.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings, SettingsError> {
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_owned(),
        source,
    })?;
    let file: Value = serde_json::from_str(&text)?;
    let defaults = serde_json::to_value(BridgeSettings::default())?;
    let settings = serde_json::from_value(deep_merge(defaults, file))?;
    tracing::debug!(path = %path.display(), "settings file loaded");
    Ok(settings)
}

/// Merge `overlay` into `base`. Objects merge key by key; anything else in
/// `overlay` replaces what is in `base`. A `null` in `overlay` keeps `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}
