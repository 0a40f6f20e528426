//! Span backends
//!
//! - [`OtelBackend`]: the OpenTelemetry global tracer (OTLP when telemetry is
//!   initialised with an endpoint)
//! - [`MemoryBackend`]: in-process collection for assertions
//! - [`JsonLinesBackend`]: one JSON object per span on any writer

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use opentelemetry::baggage::BaggageExt;
use opentelemetry::trace::{Span, SpanKind, Tracer};
use opentelemetry::{global, Context, KeyValue, Value};
use tracing::warn;

use super::{FinishedSpan, TagValue};

/// Receiver of finished spans
pub trait SpanBackend: Send + Sync {
    fn submit(&self, span: FinishedSpan);
}

/// Instrumentation scope name reported to OpenTelemetry
const TRACER_NAME: &str = "testtrace";

/// Forwards spans to the OpenTelemetry global tracer provider
#[derive(Debug, Default, Clone, Copy)]
pub struct OtelBackend;

impl OtelBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SpanBackend for OtelBackend {
    fn submit(&self, span: FinishedSpan) {
        // Looked up per span so a provider installed after construction is used.
        let tracer = global::tracer(TRACER_NAME);

        let attributes: Vec<KeyValue> = span
            .tags
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), otel_value(value)))
            .collect();
        let baggage: Vec<KeyValue> = span
            .baggage
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect();
        let cx = Context::current_with_baggage(baggage);

        let mut otel_span = tracer
            .span_builder(span.name)
            .with_kind(SpanKind::Internal)
            .with_start_time(span.start)
            .with_attributes(attributes)
            .start_with_context(&tracer, &cx);
        otel_span.end_with_timestamp(span.finish);
    }
}

fn otel_value(value: &TagValue) -> Value {
    match value {
        TagValue::Str(s) => Value::from(s.clone()),
        TagValue::Int(i) => Value::I64(*i),
        TagValue::Float(f) => Value::F64(*f),
        TagValue::Bool(b) => Value::Bool(*b),
    }
}

/// Collects spans in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every span submitted so far, in submission order
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn named(&self, name: &str) -> Vec<FinishedSpan> {
        self.spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SpanBackend for MemoryBackend {
    fn submit(&self, span: FinishedSpan) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span);
    }
}

/// Writes each span as one line of JSON
pub struct JsonLinesBackend<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesBackend<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> SpanBackend for JsonLinesBackend<W> {
    fn submit(&self, span: FinishedSpan) {
        let line = match serde_json::to_string(&span) {
            Ok(line) => line,
            Err(e) => {
                warn!(name = %span.name, error = %e, "Failed to serialize span");
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(name = %span.name, error = %e, "Failed to write span");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    fn span(name: &str) -> FinishedSpan {
        let start = SystemTime::now();
        let mut tags = BTreeMap::new();
        tags.insert("test.status".to_string(), TagValue::from("PASS"));
        FinishedSpan {
            name: name.to_string(),
            tags,
            baggage: BTreeMap::new(),
            start,
            finish: start + Duration::from_millis(3),
        }
    }

    #[test]
    fn test_memory_backend_collects_in_order() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());

        backend.submit(span("A"));
        backend.submit(span("B"));
        backend.submit(span("A"));

        let names: Vec<_> = backend.spans().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A", "B", "A"]);
        assert_eq!(backend.named("A").len(), 2);
    }

    #[test]
    fn test_json_lines_backend_writes_one_line_per_span() {
        let backend = JsonLinesBackend::new(Vec::new());
        backend.submit(span("First"));
        backend.submit(span("Second"));

        let output = String::from_utf8(backend.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "First");
        assert_eq!(first["tags"]["test.status"], "PASS");
    }

    #[test]
    fn test_otel_backend_accepts_spans_without_provider() {
        // No provider installed: the global no-op tracer swallows the span.
        OtelBackend::new().submit(span("Noop"));
    }
}
