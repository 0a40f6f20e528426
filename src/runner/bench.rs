//! Benchmark timing loop
//!
//! A benchmark case calls [`Case::iter`](super::Case::iter) with the body to
//! measure. The runner picks the iteration count N from the configured
//! [`BenchTarget`], times the loop, and records a [`BenchmarkResult`] on the
//! case for later extraction.

use std::hint::black_box;
use std::time::{Duration, Instant};

use super::alloc::AllocSnapshot;

/// Upper bound on N for duration-targeted runs
pub const MAX_ITERATIONS: u64 = 1_000_000_000;

/// How many iterations a benchmark loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchTarget {
    /// Run exactly this many iterations
    Iterations(u64),
    /// Grow N until one timed run lasts at least this long
    Duration(Duration),
}

impl Default for BenchTarget {
    fn default() -> Self {
        BenchTarget::Duration(Duration::from_secs(1))
    }
}

/// Outcome of the final timed run of a benchmark
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchmarkResult {
    /// Iterations in the final run (N)
    pub iterations: u64,
    /// Total time of the final run
    pub elapsed: Duration,
    /// Allocations made during the final run
    pub mem_allocs: u64,
    /// Bytes allocated during the final run
    pub mem_bytes: u64,
}

impl BenchmarkResult {
    pub fn allocs_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        self.mem_allocs / self.iterations
    }

    pub fn bytes_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        self.mem_bytes / self.iterations
    }
}

/// Run `body` according to `target` and return the final run's figures
pub(crate) fn measure<R, F>(target: BenchTarget, body: &mut F) -> BenchmarkResult
where
    F: FnMut() -> R,
{
    match target {
        BenchTarget::Iterations(n) => run_iterations(n.max(1), body),
        BenchTarget::Duration(goal) => {
            let mut n = 1;
            loop {
                let result = run_iterations(n, body);
                if result.elapsed >= goal || n >= MAX_ITERATIONS {
                    return result;
                }
                n = predict_iterations(goal, n, result.elapsed);
            }
        }
    }
}

fn run_iterations<R, F>(n: u64, body: &mut F) -> BenchmarkResult
where
    F: FnMut() -> R,
{
    let before = AllocSnapshot::now();
    let start = Instant::now();
    for _ in 0..n {
        black_box(body());
    }
    let elapsed = start.elapsed();
    let allocated = AllocSnapshot::now().since(&before);

    BenchmarkResult {
        iterations: n,
        elapsed,
        mem_allocs: allocated.allocations,
        mem_bytes: allocated.bytes,
    }
}

/// Next N for a duration target: extrapolate from the previous run with 20%
/// headroom, grow by at most 100x and at least by one, never past the cap.
pub(crate) fn predict_iterations(goal: Duration, prev: u64, elapsed: Duration) -> u64 {
    let prev = prev as u128;
    let prev_ns = elapsed.as_nanos().max(1);

    let mut n = goal.as_nanos().saturating_mul(prev) / prev_ns;
    n += n / 5;
    let n = n
        .min(prev * 100)
        .max(prev + 1)
        .min(MAX_ITERATIONS as u128);

    n as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_iterations() {
        let mut calls = 0u64;
        let result = measure(BenchTarget::Iterations(250), &mut || calls += 1);
        assert_eq!(calls, 250);
        assert_eq!(result.iterations, 250);
    }

    #[test]
    fn test_zero_iterations_runs_once() {
        let mut calls = 0u64;
        let result = measure(BenchTarget::Iterations(0), &mut || calls += 1);
        assert_eq!(calls, 1);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_predict_growth_bounds() {
        let goal = Duration::from_secs(1);

        // 1 iteration took 1ms: extrapolate 1000, +20%, capped at 100x
        assert_eq!(predict_iterations(goal, 1, Duration::from_millis(1)), 100);

        // 100 iterations took 100ms: 1000 + 20%
        assert_eq!(
            predict_iterations(goal, 100, Duration::from_millis(100)),
            1_200
        );

        // Already over the goal: still grows by at least one
        assert_eq!(predict_iterations(goal, 10, Duration::from_secs(5)), 11);

        // Zero elapsed does not divide by zero and respects the cap
        assert!(predict_iterations(goal, MAX_ITERATIONS, Duration::ZERO) <= MAX_ITERATIONS);
    }

    #[test]
    fn test_duration_target_reaches_goal() {
        let goal = Duration::from_millis(5);
        let result = measure(BenchTarget::Duration(goal), &mut || {
            std::thread::sleep(Duration::from_micros(100))
        });
        assert!(result.elapsed >= goal);
        assert!(result.iterations > 1);
    }

    #[test]
    fn test_per_op_division() {
        let result = BenchmarkResult {
            iterations: 1000,
            elapsed: Duration::from_nanos(5_000_000),
            mem_allocs: 2000,
            mem_bytes: 64_500,
        };
        assert_eq!(result.allocs_per_op(), 2);
        assert_eq!(result.bytes_per_op(), 64);
        assert_eq!(BenchmarkResult::default().allocs_per_op(), 0);
    }
}
