//! Instrumentation configuration
//!
//! Read from the process environment at startup:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `TESTTRACE_SERVICE_NAME` | `service.name` resource attribute | `testtrace` |
//! | `TESTTRACE_OTLP_ENDPOINT` | OTLP collector; unset disables export | none |
//! | `TESTTRACE_DISABLE_NESTED_HOOK` | any value but `0`/`false` disables the hook | off |
//! | `RUST_TEST_THREADS` | runner worker threads | 1 |
//! | `TESTTRACE_BENCH_ITERATIONS` | fixed benchmark N | unset |
//! | `TESTTRACE_BENCH_TIME_MS` | benchmark time target | 1000 |

use std::time::Duration;

use tracing::warn;

use crate::runner::{BenchTarget, RunnerConfig};

pub const ENV_SERVICE_NAME: &str = "TESTTRACE_SERVICE_NAME";
pub const ENV_OTLP_ENDPOINT: &str = "TESTTRACE_OTLP_ENDPOINT";
pub const ENV_DISABLE_NESTED_HOOK: &str = "TESTTRACE_DISABLE_NESTED_HOOK";
pub const ENV_TEST_THREADS: &str = "RUST_TEST_THREADS";
pub const ENV_BENCH_ITERATIONS: &str = "TESTTRACE_BENCH_ITERATIONS";
pub const ENV_BENCH_TIME_MS: &str = "TESTTRACE_BENCH_TIME_MS";

const DEFAULT_SERVICE_NAME: &str = "testtrace";

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationConfig {
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub disable_nested_hook: bool,
    pub parallelism: usize,
    pub bench_target: BenchTarget,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            disable_nested_hook: false,
            parallelism: 1,
            bench_target: BenchTarget::default(),
        }
    }
}

impl InstrumentationConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back
    /// to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bench_target = match (
            non_empty(ENV_BENCH_ITERATIONS).and_then(|v| parse_number::<u64>(ENV_BENCH_ITERATIONS, &v)),
            non_empty(ENV_BENCH_TIME_MS).and_then(|v| parse_number::<u64>(ENV_BENCH_TIME_MS, &v)),
        ) {
            (Some(n), _) => BenchTarget::Iterations(n),
            (None, Some(ms)) => BenchTarget::Duration(Duration::from_millis(ms)),
            (None, None) => defaults.bench_target,
        };

        Self {
            service_name: non_empty(ENV_SERVICE_NAME).unwrap_or(defaults.service_name),
            otlp_endpoint: non_empty(ENV_OTLP_ENDPOINT),
            disable_nested_hook: non_empty(ENV_DISABLE_NESTED_HOOK)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            parallelism: non_empty(ENV_TEST_THREADS)
                .and_then(|v| parse_number::<usize>(ENV_TEST_THREADS, &v))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.parallelism),
            bench_target,
        }
    }

    pub fn nested_hook_enabled(&self) -> bool {
        !self.disable_nested_hook
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            parallelism: self.parallelism,
            bench_target: self.bench_target,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    !(value == "0" || value.eq_ignore_ascii_case("false"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = key, value, "Ignoring unparseable value");
            None
        }
    }
}
