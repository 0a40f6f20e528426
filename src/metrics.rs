//! Prometheus metrics for the instrumentation pipeline
//!
//! Counters describe what the interception layer did with each invocation it
//! saw. They are registered in the default registry on first use and can be
//! dumped with [`render`] at the end of a run.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, register_int_gauge, Encoder,
    Gauge, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Span Emission
    // ─────────────────────────────────────────────────────────────────────────────

    /// Spans handed to the backend.
    ///
    /// Labels:
    /// - type: "test" or "benchmark"
    /// - status: "PASS" or "FAIL"
    pub static ref SPANS_EMITTED: IntCounterVec = register_int_counter_vec!(
        "testtrace_spans_emitted_total",
        "Leaf invocations reported as spans",
        &["type", "status"]
    ).expect("failed to register SPANS_EMITTED metric");

    /// Invocations that turned out to have nested cases (no span).
    pub static ref COMPOSITES_SUPPRESSED: IntCounter = register_int_counter!(
        "testtrace_composites_suppressed_total",
        "Composite invocations skipped because they have nested cases"
    ).expect("failed to register COMPOSITES_SUPPRESSED metric");

    /// Invocations already inside an instrumented ancestor.
    pub static ref PASSTHROUGHS: IntCounter = register_int_counter!(
        "testtrace_passthroughs_total",
        "Invocations passed through because they were already instrumented"
    ).expect("failed to register PASSTHROUGHS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Degradations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Spans skipped because the runner outcome could not be read.
    pub static ref RESULT_UNAVAILABLE: IntCounter = register_int_counter!(
        "testtrace_result_unavailable_total",
        "Invocations whose runner outcome could not be extracted"
    ).expect("failed to register RESULT_UNAVAILABLE metric");

    /// Spans emitted without a code location.
    pub static ref SOURCE_UNRESOLVED: IntCounter = register_int_counter!(
        "testtrace_source_unresolved_total",
        "Source bound lookups that failed"
    ).expect("failed to register SOURCE_UNRESOLVED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records held by all instrumentation registries.
    pub static ref REGISTRY_RECORDS: IntGauge = register_int_gauge!(
        "testtrace_registry_records",
        "Cases recorded in the instrumentation registry"
    ).expect("failed to register REGISTRY_RECORDS metric");

    /// Whether the nested-run hook is installed (1) or not (0).
    pub static ref NESTED_HOOK_INSTALLED: Gauge = register_gauge!(
        "testtrace_nested_hook_installed",
        "Whether nested cases are intercepted through the runner hook"
    ).expect("failed to register NESTED_HOOK_INSTALLED metric");
}

/// Mark the nested-run hook as installed or not.
pub fn set_hook_installed(installed: bool) {
    NESTED_HOOK_INSTALLED.set(if installed { 1.0 } else { 0.0 });
}

/// Encode the default registry in the Prometheus text format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        PASSTHROUGHS.inc();
        set_hook_installed(true);

        let text = render();
        assert!(text.contains("testtrace_passthroughs_total"));
        assert!(text.contains("testtrace_nested_hook_installed"));
    }
}
