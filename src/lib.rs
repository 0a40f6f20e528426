//! testtrace - tracing instrumentation for tests and benchmarks
//!
//! Attaches to a test runner and reports every leaf test, sub-test and
//! benchmark as one span with a logical name, pass/fail status, source
//! location and (for benchmarks) iteration, timing and allocation statistics.
//! Composite cases that only group sub-cases produce no span of their own.
//!
//! # Modules
//!
//! - `runner` - host test/benchmark runner with hook points
//! - `instrument` - interception, registry, hierarchy resolution, extraction
//! - `source` - function source bounds lookup
//! - `span` - span construction and backends
//! - `config` - environment configuration
//! - `telemetry` - logging and OTLP export setup
//! - `metrics` - Prometheus counters for the instrumentation pipeline
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use testtrace::{instrument, InstrumentationConfig, MemoryBackend, Runner};
//!
//! let config = InstrumentationConfig::from_env();
//! let mut runner = Runner::with_config("sorting", config.runner_config());
//! runner.add_test("Outer", |case| {
//!     case.run("Inner", |inner| assert_eq!(2 + 2, 4));
//! });
//!
//! let backend = Arc::new(MemoryBackend::new());
//! instrument::init(&mut runner, &config, backend.clone());
//! runner.run();
//! assert_eq!(backend.named("Outer/Inner").len(), 1);
//! ```

pub mod config;
pub mod instrument;
pub mod metrics;
pub mod runner;
pub mod source;
pub mod span;
pub mod telemetry;

// Re-export commonly used types at crate root for convenience
pub use config::InstrumentationConfig;
pub use instrument::{InstrumentOutcome, Instrumented, Interceptor};
pub use runner::{BenchTarget, Case, CaseKind, CountingAllocator, Runner, RunnerConfig};
pub use span::{FinishedSpan, JsonLinesBackend, MemoryBackend, OtelBackend, SpanBackend, TagValue};
pub use telemetry::{init_telemetry, TelemetryGuard};
