//! Execution result extraction
//!
//! Reads what the runner recorded for a finished case and condenses it into
//! the figures a span reports. Extraction never changes the case.

use std::time::Duration;

use crate::runner::{Case, CaseKind};

/// Benchmark figures, per operation where noted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkStats {
    /// N of the final timed run
    pub iterations: u64,
    pub allocs_per_op: u64,
    pub bytes_per_op: u64,
}

/// Outcome of one finished invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub kind: CaseKind,
    /// Measured duration: wall time for tests, timed loop for benchmarks
    pub elapsed: Duration,
    pub passed: bool,
    /// The case started nested cases of its own
    pub has_children: bool,
    pub benchmark: Option<BenchmarkStats>,
}

impl ExecutionResult {
    /// Mean nanoseconds per iteration, rounded to hundredths
    pub fn mean_ns_per_op(&self) -> Option<f64> {
        let stats = self.benchmark?;
        if stats.iterations == 0 {
            return Some(0.0);
        }
        let mean = self.elapsed.as_nanos() as f64 / stats.iterations as f64;
        Some((mean * 100.0).round() / 100.0)
    }
}

/// Error reading a case outcome from the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    ResultUnavailable { case: String, reason: &'static str },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::ResultUnavailable { case, reason } => {
                write!(f, "Result unavailable for {}: {}", case, reason)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Pull the recorded outcome of `case`
pub fn extract(case: &Case) -> Result<ExecutionResult, ExtractError> {
    if !case.is_finished() {
        return Err(ExtractError::ResultUnavailable {
            case: case.name().to_string(),
            reason: "case has not finished",
        });
    }

    let outcome = case.outcome().ok_or_else(|| ExtractError::ResultUnavailable {
        case: case.name().to_string(),
        reason: "runner recorded no outcome",
    })?;

    let benchmark = match case.kind() {
        CaseKind::Test => None,
        CaseKind::Benchmark => {
            let result = outcome.benchmark.ok_or_else(|| ExtractError::ResultUnavailable {
                case: case.name().to_string(),
                reason: "benchmark outcome has no timing result",
            })?;
            Some(BenchmarkStats {
                iterations: result.iterations,
                allocs_per_op: result.allocs_per_op(),
                bytes_per_op: result.bytes_per_op(),
            })
        }
    };

    Ok(ExecutionResult {
        kind: case.kind(),
        elapsed: outcome.elapsed,
        passed: outcome.passed,
        has_children: case.child_count() > 0,
        benchmark,
    })
}
