use std::io;
use std::sync::Arc;
use std::time::Duration;

use testtrace::{
    init_telemetry, instrument, metrics, CountingAllocator, InstrumentationConfig,
    JsonLinesBackend, OtelBackend, Runner, SpanBackend,
};

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

fn sort_numbers(case: &testtrace::Case) {
    let mut values = vec![5, 3, 9, 1, 7];
    values.sort();
    if values != [1, 3, 5, 7, 9] {
        case.error("values not sorted");
    }
}

fn table_driven(case: &testtrace::Case) {
    for (name, input, want) in [("empty input", "", 0), ("single word", "hello", 1), ("two words", "a b", 2)] {
        case.run(name, |sub| {
            let got = input.split_whitespace().count();
            if got != want {
                sub.error(format!("got {}, want {}", got, want));
            }
        });
    }
}

fn known_failure(case: &testtrace::Case) {
    case.error("expected failure to show a FAIL span");
}

fn bench_vec_push(case: &testtrace::Case) {
    case.iter(|| {
        let mut v = Vec::with_capacity(16);
        v.extend(0..16u32);
        v
    });
}

fn bench_string_format(case: &testtrace::Case) {
    for width in [8usize, 64] {
        case.run(&format!("width {}", width), |sub| {
            sub.iter(|| format!("{:>width$}", 42, width = width));
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = InstrumentationConfig::from_env();
    let guard = init_telemetry(&config)?;

    // 1. Declare the suite
    let mut runner = Runner::with_config("testtrace_demo", config.runner_config());
    runner
        .add_test("sort_numbers", sort_numbers)
        .add_test("table_driven", table_driven)
        .add_test("known_failure", known_failure)
        .add_benchmark("bench_vec_push", bench_vec_push)
        .add_benchmark("bench_string_format", bench_string_format);

    // 2. Pick a backend: OTLP when a collector is configured, else stdout
    let backend: Arc<dyn SpanBackend> = if guard.otlp_enabled() {
        Arc::new(OtelBackend::new())
    } else {
        Arc::new(JsonLinesBackend::new(io::stdout()))
    };
    instrument::init(&mut runner, &config, backend);

    // 3. Run off the async workers so the batch exporter keeps flushing
    let summary = tokio::task::spawn_blocking(move || runner.run()).await?;

    println!("--------------------------------------------------");
    println!("passed: {:?}", summary.passed);
    println!("failed: {:?}", summary.failed);
    println!("--------------------------------------------------");
    print!("{}", metrics::render());

    // Let the exporter drain before the guard shuts it down
    if guard.otlp_enabled() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    drop(guard);
    Ok(())
}
