//! JSONL layer.
//!
//! One object per line: timestamp, level, service, pid, target, message,
//! then the structured fields of the event (`event_id`, `topic`, ...).

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::ObservabilityMode;

/// Field names that carry personal data or raw event bodies.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "payload",
    "email",
    "beneficiary_email",
    "contact_email",
    "error_message",
];

/// Replacement written for sensitive fields in metadata-only mode.
pub const REDACTED: &str = "[redacted]";

/// One line of the central log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    /// Module path of the call site.
    pub target: String,
    pub message: String,
    /// Structured fields, sorted by name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    /// Innermost span, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

/// Splits an event into its message and its structured fields.
#[derive(Default)]
struct EventFields {
    message: String,
    fields: BTreeMap<String, Value>,
}

impl EventFields {
    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(text)) => self.message = text,
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    fn redact(&mut self) {
        for name in SENSITIVE_FIELDS {
            if let Some(value) = self.fields.get_mut(*name) {
                *value = Value::String(REDACTED.to_string());
            }
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

pub struct JsonLayer<W> {
    service_name: String,
    pid: u32,
    mode: ObservabilityMode,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, mode: ObservabilityMode, make_writer: W) -> Self {
        Self {
            service_name,
            pid: std::process::id(),
            mode,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorded = EventFields::default();
        event.record(&mut recorded);
        if self.mode == ObservabilityMode::MetadataOnly {
            recorded.redact();
        }

        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: metadata.level().as_str(),
            service: self.service_name.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            message: recorded.message,
            fields: recorded.fields,
            span: ctx.event_span(event).map(|span| span.name().to_string()),
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(self.make_writer.make_writer(), "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(mode: ObservabilityMode, emit: impl FnOnce()) -> serde_json::Value {
        let buffer = Buffer::default();
        let layer = JsonLayer::new("courier".to_string(), mode, buffer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);

        let bytes = buffer.0.lock().clone();
        let line = String::from_utf8(bytes).unwrap();
        serde_json::from_str(line.trim()).unwrap()
    }

    #[test]
    fn test_event_fields_are_written() {
        let entry = capture(ObservabilityMode::Verbose, || {
            tracing::info!(
                event_id = "3f0c8c1e-2c59-4b8e-9d6a-0d1b2c3d4e5f",
                attempt = 2u64,
                email = "jane@example.com",
                "Published event"
            );
        });

        assert_eq!(entry["service"], "courier");
        assert_eq!(entry["level"], "INFO");
        assert_eq!(entry["message"], "Published event");
        assert_eq!(entry["fields"]["attempt"], 2);
        assert_eq!(entry["fields"]["email"], "jane@example.com");
    }

    #[test]
    fn test_metadata_only_redacts_personal_data() {
        let entry = capture(ObservabilityMode::MetadataOnly, || {
            tracing::warn!(
                event_id = "3f0c8c1e-2c59-4b8e-9d6a-0d1b2c3d4e5f",
                contact_email = "contact@boulangerie.fr",
                "Subscriber failed"
            );
        });

        assert_eq!(entry["fields"]["contact_email"], REDACTED);
        assert_eq!(
            entry["fields"]["event_id"],
            "3f0c8c1e-2c59-4b8e-9d6a-0d1b2c3d4e5f"
        );
    }
}
