use std::collections::VecDeque;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A log record kept in the in-memory diagnostic buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: u64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub client_id: Option<String>,
}

/// Query parameters for searching buffered logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    /// Keep records at least this severe.
    pub min_level: Option<tracing::Level>,
    pub target: Option<String>,
    pub client_id: Option<String>,
    pub message: Option<String>,
    pub limit: Option<usize>,
}

/// Bounded ring of the most recent log records.
pub struct LogBuffer {
    inner: Mutex<Ring>,
}

struct Ring {
    records: VecDeque<LogRecord>,
    capacity: usize,
    next_seq: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                records: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                next_seq: 1,
            }),
        }
    }

    fn push(&self, mut record: LogRecord) {
        let mut ring = self.inner.lock();
        record.seq = ring.next_seq;
        ring.next_seq += 1;
        if ring.records.len() == ring.capacity {
            ring.records.pop_front();
        }
        ring.records.push_back(record);
    }

    /// Matching records, most recent first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let ring = self.inner.lock();
        let limit = q.limit.unwrap_or(100);
        ring.records
            .iter()
            .rev()
            .filter(|r| q.level.as_ref().map_or(true, |l| r.level.eq_ignore_ascii_case(l)))
            .filter(|r| {
                q.min_level.map_or(true, |min| {
                    tracing::Level::from_str(&r.level).map_or(false, |level| level <= min)
                })
            })
            .filter(|r| q.target.as_ref().map_or(true, |t| r.target.contains(t.as_str())))
            .filter(|r| {
                q.client_id
                    .as_ref()
                    .map_or(true, |c| r.client_id.as_deref() == Some(c.as_str()))
            })
            .filter(|r| q.message.as_ref().map_or(true, |m| r.message.contains(m.as_str())))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Write matching records to `writer` as JSON lines, oldest first.
    pub fn write_json_lines<W: Write>(&self, q: &LogQuery, mut writer: W) -> std::io::Result<usize> {
        let records = self.query(q);
        for record in records.iter().rev() {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(records.len())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// tracing Layer that copies events at or above `min_level` into a [`LogBuffer`].
pub struct LogBufferLayer {
    buffer: Arc<LogBuffer>,
    min_level: tracing::Level,
}

impl LogBufferLayer {
    pub fn new(buffer: Arc<LogBuffer>, min_level: tracing::Level) -> Self {
        Self { buffer, min_level }
    }
}

struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    client_id: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
            client_id: None,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        match field.name() {
            "message" => self.message = Some(val),
            "client_id" => self.client_id = Some(val.trim_matches('"').to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(val));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "client_id" => self.client_id = Some(value.to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// Stored on spans so child events inherit the operation's `client_id`.
struct SpanFields {
    client_id: String,
}

impl<S> Layer<S> for LogBufferLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        if visitor.client_id.is_none() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    let extensions = span.extensions();
                    if let Some(fields) = extensions.get::<SpanFields>() {
                        visitor.client_id = Some(fields.client_id.clone());
                        break;
                    }
                }
            }
        }

        self.buffer.push(LogRecord {
            seq: 0,
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            client_id: visitor.client_id,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        attrs.record(&mut visitor);

        if let Some(client_id) = visitor.client_id {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(SpanFields { client_id });
            }
        }
    }
}
