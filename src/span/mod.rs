//! Span construction for finished leaf invocations
//!
//! One [`FinishedSpan`] is built per instrumented leaf: the logical name, the
//! tag set describing the test or benchmark, the `trace.kind` baggage, and an
//! explicit time window anchored at the recorded start. The finished span is
//! handed to a [`SpanBackend`] in a single call.
//!
//! ```text
//!   start (recorded before the body ran)
//!     │<────────── result.elapsed ──────────>│
//!     ▼                                      ▼
//!   [start ................................ finish]   → SpanBackend::submit
//! ```

pub mod backend;

pub use backend::{JsonLinesBackend, MemoryBackend, OtelBackend, SpanBackend};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::instrument::ExecutionResult;
use crate::metrics::SPANS_EMITTED;
use crate::source::SourceBound;

pub const FRAMEWORK: &str = "testtrace";
pub const LANGUAGE: &str = "rust";

/// Tag value as reported to the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        TagValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

/// A span with its complete time window and tags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedSpan {
    pub name: String,
    pub tags: BTreeMap<String, TagValue>,
    pub baggage: BTreeMap<String, String>,
    #[serde(rename = "start_unix_nanos", serialize_with = "unix_nanos")]
    pub start: SystemTime,
    #[serde(rename = "finish_unix_nanos", serialize_with = "unix_nanos")]
    pub finish: SystemTime,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn duration(&self) -> Duration {
        self.finish.duration_since(self.start).unwrap_or_default()
    }
}

fn unix_nanos<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    serializer.serialize_u128(nanos)
}

/// Build the span for one finished leaf invocation.
///
/// `test.code` is omitted when `source` is `None`; benchmark tags are
/// present only for benchmark results.
pub fn build_span(
    logical_name: &str,
    suite: &str,
    result: &ExecutionResult,
    source: Option<&SourceBound>,
    start: SystemTime,
) -> FinishedSpan {
    let mut tags = BTreeMap::new();
    let mut tag = |key: &str, value: TagValue| {
        tags.insert(key.to_string(), value);
    };

    tag("span.kind", "test".into());
    tag("test.name", logical_name.into());
    tag("test.suite", suite.into());
    if let Some(bound) = source {
        tag("test.code", bound.to_string().into());
    }
    tag("test.framework", FRAMEWORK.into());
    tag("test.language", LANGUAGE.into());
    tag("test.type", result.kind.as_str().into());
    tag("test.status", status(result.passed).into());

    if let Some(stats) = result.benchmark {
        tag("benchmark.runs", stats.iterations.into());
        if let Some(mean) = result.mean_ns_per_op() {
            tag("benchmark.duration.mean", mean.into());
        }
        tag("benchmark.memory.mean_allocations", stats.allocs_per_op.into());
        tag(
            "benchmark.memory.mean_bytes_allocations",
            stats.bytes_per_op.into(),
        );
    }

    let mut baggage = BTreeMap::new();
    baggage.insert("trace.kind".to_string(), "test".to_string());

    FinishedSpan {
        name: logical_name.to_string(),
        tags,
        baggage,
        start,
        finish: start + result.elapsed,
    }
}

fn status(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Builds spans and submits them to a backend
#[derive(Clone)]
pub struct SpanEmitter {
    backend: Arc<dyn SpanBackend>,
}

impl SpanEmitter {
    pub fn new(backend: Arc<dyn SpanBackend>) -> Self {
        Self { backend }
    }

    pub fn emit(
        &self,
        logical_name: &str,
        suite: &str,
        result: &ExecutionResult,
        source: Option<&SourceBound>,
        start: SystemTime,
    ) {
        let span = build_span(logical_name, suite, result, source, start);
        let status = status(result.passed);

        SPANS_EMITTED
            .with_label_values(&[result.kind.as_str(), status])
            .inc();
        debug!(
            name = %span.name,
            kind = result.kind.as_str(),
            status,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Emitting span"
        );

        self.backend.submit(span);
    }
}

impl std::fmt::Debug for SpanEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanEmitter").finish_non_exhaustive()
    }
}
