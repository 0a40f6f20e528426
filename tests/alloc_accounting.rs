//! Allocation accounting with the counting allocator installed
//!
//! Lives in its own test binary so the global allocator only applies here.

use std::hint::black_box;
use std::sync::Arc;

use testtrace::instrument;
use testtrace::{BenchTarget, CountingAllocator, InstrumentationConfig, MemoryBackend, Runner, TagValue};

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

#[test]
fn test_benchmark_reports_allocations_per_op() {
    let config = InstrumentationConfig {
        bench_target: BenchTarget::Iterations(1000),
        ..Default::default()
    };
    let mut runner = Runner::with_config("alloc", config.runner_config());
    runner.add_benchmark("BenchmarkTwoBoxes", |case| {
        case.iter(|| {
            let a = black_box(Box::new([1u8; 32]));
            let b = black_box(Box::new([2u8; 32]));
            (a, b)
        });
    });

    let backend = Arc::new(MemoryBackend::new());
    instrument::init(&mut runner, &config, backend.clone());
    assert!(runner.run().success());

    let span = &backend.named("BenchmarkTwoBoxes")[0];
    assert_eq!(span.tag("benchmark.runs"), Some(&TagValue::Int(1000)));
    assert_eq!(span.tag("benchmark.memory.mean_allocations"), Some(&TagValue::Int(2)));
    assert_eq!(
        span.tag("benchmark.memory.mean_bytes_allocations"),
        Some(&TagValue::Int(64))
    );
}
