//! Test and benchmark instrumentation
//!
//! [`init`] attaches an [`Interceptor`] to a [`Runner`] through both of its
//! hook capabilities:
//!
//! 1. every declared top-level entry is wrapped so it runs through
//!    [`Interceptor::maybe_instrument`]
//! 2. the interceptor is installed as the runner's nested-run hook, unless
//!    disabled by configuration
//!
//! Each leaf case then yields exactly one span; composite cases yield none.

pub mod extract;
pub mod hierarchy;
pub mod interceptor;
pub mod registry;

pub use extract::{extract, BenchmarkStats, ExecutionResult, ExtractError};
pub use hierarchy::{function_name, is_synthetic, logical_parent, resolve, MARKER_SEGMENT};
pub use interceptor::{InstrumentOutcome, Instrumented, Interceptor};
pub use registry::{InstrumentationRecord, InstrumentationRegistry, RecordRole};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::InstrumentationConfig;
use crate::metrics::set_hook_installed;
use crate::runner::{Case, Declaration, Runner};
use crate::source::CallSite;
use crate::span::SpanBackend;

/// Instrument `runner`, reporting spans to `backend`
pub fn init(
    runner: &mut Runner,
    config: &InstrumentationConfig,
    backend: Arc<dyn SpanBackend>,
) -> Arc<Interceptor> {
    attach(runner, config, Arc::new(Interceptor::new(backend)))
}

/// Instrument `runner` with an existing interceptor
pub fn attach(
    runner: &mut Runner,
    config: &InstrumentationConfig,
    interceptor: Arc<Interceptor>,
) -> Arc<Interceptor> {
    info!(
        suite = %runner.suite(),
        parallelism = runner.config().parallelism,
        "Instrumenting runner"
    );

    let mut wrapped = 0usize;
    runner.wrap_declared(|decl| {
        wrapped += 1;
        let func = Arc::clone(&decl.func);
        let site = CallSite::declared(decl.location, decl.function);
        let interceptor = Arc::clone(&interceptor);
        Declaration {
            func: Arc::new(move |case: &Case| {
                interceptor.maybe_instrument(case, site, |c| func(c));
            }),
            ..decl
        }
    });

    if config.nested_hook_enabled() {
        match runner.install_nested_hook(interceptor.clone()) {
            Ok(()) => {
                set_hook_installed(true);
                info!(declared = wrapped, "Nested-run hook installed");
            }
            Err(e) => {
                set_hook_installed(false);
                warn!(
                    error = %e,
                    declared = wrapped,
                    "Nested-run hook unavailable, instrumenting declared cases only"
                );
            }
        }
    } else {
        set_hook_installed(false);
        info!(declared = wrapped, "Nested-run hook disabled by configuration");
    }

    interceptor
}
