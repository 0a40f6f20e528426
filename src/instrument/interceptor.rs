//! Interception layer
//!
//! Every entry point that can observe a case invocation converges on
//! [`Interceptor::maybe_instrument`]:
//!
//! ```text
//!  declared table entry ──┐
//!  Case::run (hook) ──────┼──► maybe_instrument(case, site, f)
//!  Instrumented::run ─────┘          │
//!                                    ├─ registered?        → pass through
//!                                    ├─ claim (Origin)     → lost race: pass through
//!                                    ├─ run f under "*&"   (Synthetic)
//!                                    ├─ nested cases?      → composite, no span
//!                                    └─ extract, resolve, locate, emit
//! ```
//!
//! The user function always runs exactly once, on the calling thread, and its
//! pass/fail reaches the claimed handle through ordinary failure
//! propagation.

use std::panic::Location;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::extract::extract;
use super::hierarchy::{function_name, resolve, MARKER_SEGMENT};
use super::registry::{InstrumentationRecord, InstrumentationRegistry};
use crate::metrics::{COMPOSITES_SUPPRESSED, PASSTHROUGHS, RESULT_UNAVAILABLE};
use crate::runner::{Case, NestedRunHook};
use crate::source::{CallSite, SourceLocator, SynIndex};
use crate::span::{SpanBackend, SpanEmitter};

/// What `maybe_instrument` did with an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentOutcome {
    /// Already instrumented; the function ran directly
    PassedThrough,
    /// Ran under the wrapper but started nested cases; no span
    Composite,
    /// Leaf; one span emitted
    Emitted,
    /// Leaf whose outcome could not be read; no span
    Skipped,
}

/// Instrumentation service: owns the registry, source locator and emitter
pub struct Interceptor {
    registry: Arc<InstrumentationRegistry>,
    locator: SourceLocator,
    emitter: SpanEmitter,
}

impl Interceptor {
    pub fn new(backend: Arc<dyn SpanBackend>) -> Self {
        Self {
            registry: Arc::new(InstrumentationRegistry::new()),
            locator: SourceLocator::new(Box::new(SynIndex::new())),
            emitter: SpanEmitter::new(backend),
        }
    }

    pub fn with_locator(mut self, locator: SourceLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn registry(&self) -> &Arc<InstrumentationRegistry> {
        &self.registry
    }

    /// Run `f` for `case`, emitting one span if this is the first time the
    /// case is seen and it turns out to be a leaf.
    ///
    /// `site` is a caller location, or a [`CallSite`] naming the declared
    /// function so its source can be found outside the caller's file.
    pub fn maybe_instrument<F>(
        &self,
        case: &Case,
        site: impl Into<CallSite>,
        f: F,
    ) -> InstrumentOutcome
    where
        F: FnOnce(&Case),
    {
        if self.registry.has_record(case.id()) {
            return self.pass_through(case, f);
        }

        let start = SystemTime::now();
        if !self
            .registry
            .add_record(InstrumentationRecord::origin(case.id(), start))
        {
            return self.pass_through(case, f);
        }

        let mut wrapper = None;
        case.run_native(MARKER_SEGMENT, |child| {
            self.registry
                .add_record(InstrumentationRecord::synthetic(child.id(), start));
            wrapper = Some(child.clone());
            f(child);
        });
        // Only reachable with a runner that returns without invoking the body
        let Some(wrapper) = wrapper else {
            RESULT_UNAVAILABLE.inc();
            warn!(case = %case.name(), "Wrapper case never ran, skipping span");
            return InstrumentOutcome::Skipped;
        };

        self.report(case, &wrapper, &site.into(), start)
    }

    /// Emit the span for `wrapper` once its body has returned.
    ///
    /// A wrapper that started nested cases is a composite and emits nothing.
    /// A wrapper whose outcome cannot be read is skipped.
    pub(crate) fn report(
        &self,
        case: &Case,
        wrapper: &Case,
        site: &CallSite,
        start: SystemTime,
    ) -> InstrumentOutcome {
        if wrapper.child_count() > 0 {
            COMPOSITES_SUPPRESSED.inc();
            debug!(case = %case.name(), children = wrapper.child_count(), "Composite case, no span");
            return InstrumentOutcome::Composite;
        }

        let result = match extract(wrapper) {
            Ok(result) => result,
            Err(e) => {
                RESULT_UNAVAILABLE.inc();
                warn!(case = %case.name(), error = %e, "Skipping span");
                return InstrumentOutcome::Skipped;
            }
        };

        let logical = resolve(wrapper.name());
        let source = self.locator.locate_site(site, function_name(&logical));
        self.emitter
            .emit(&logical, case.suite(), &result, source.as_ref(), start);
        InstrumentOutcome::Emitted
    }

    fn pass_through<F>(&self, case: &Case, f: F) -> InstrumentOutcome
    where
        F: FnOnce(&Case),
    {
        PASSTHROUGHS.inc();
        debug!(case = %case.name(), "Already instrumented, passing through");
        f(case);
        InstrumentOutcome::PassedThrough
    }

    /// Typed wrapper around `case` whose nested runs are always instrumented
    pub fn scope(&self, case: &Case) -> Instrumented<'_> {
        Instrumented {
            interceptor: self,
            case: case.clone(),
        }
    }
}

impl NestedRunHook for Interceptor {
    fn run_nested(
        &self,
        parent: &Case,
        name: &str,
        caller: &'static Location<'static>,
        f: &mut dyn FnMut(&Case),
    ) -> bool {
        parent.run_native(name, |child| {
            self.maybe_instrument(child, caller, |c| f(c));
        })
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("records", &self.registry.len())
            .field("locator", &self.locator)
            .finish()
    }
}

/// A case handle whose nested runs go through the interceptor regardless of
/// whether the runner hook is installed
pub struct Instrumented<'a> {
    interceptor: &'a Interceptor,
    case: Case,
}

impl Instrumented<'_> {
    pub fn case(&self) -> &Case {
        &self.case
    }

    /// Registry record of the wrapped handle, if it has been instrumented
    pub fn record(&self) -> Option<InstrumentationRecord> {
        self.interceptor.registry.get_record(self.case.id())
    }

    /// Run `f` as nested case `name`; returns whether it passed
    #[track_caller]
    pub fn run<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&Case),
    {
        let caller = Location::caller();
        self.case.run_native(name, |child| {
            self.interceptor.maybe_instrument(child, caller, f);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::RecordRole;
    use crate::runner::{BenchTarget, Runner, RunnerConfig};
    use crate::span::{MemoryBackend, TagValue};
    use std::sync::Mutex;

    fn interceptor() -> (Arc<Interceptor>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (Arc::new(Interceptor::new(backend.clone())), backend)
    }

    fn runner() -> Runner {
        Runner::with_config(
            "interceptor",
            RunnerConfig {
                parallelism: 1,
                bench_target: BenchTarget::Iterations(5),
            },
        )
    }

    #[test]
    fn test_leaf_emits_one_span() {
        let (interceptor, backend) = interceptor();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let mut runner = runner();

        let (i, o) = (Arc::clone(&interceptor), Arc::clone(&outcomes));
        runner.add_test("leaf_case", move |case| {
            let outcome = i.maybe_instrument(case, Location::caller(), |_| {});
            o.lock().unwrap().push(outcome);
        });
        assert!(runner.run().success());

        assert_eq!(*outcomes.lock().unwrap(), vec![InstrumentOutcome::Emitted]);
        let spans = backend.named("leaf_case");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tag("test.suite"), Some(&TagValue::from("interceptor")));
    }

    #[test]
    fn test_second_call_on_same_handle_passes_through() {
        let (interceptor, backend) = interceptor();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let mut runner = runner();

        let (i, o) = (Arc::clone(&interceptor), Arc::clone(&outcomes));
        runner.add_test("Twice", move |case| {
            let here = Location::caller();
            let first = i.maybe_instrument(case, here, |_| {});
            let second = i.maybe_instrument(case, here, |_| {});
            o.lock().unwrap().extend([first, second]);
        });
        assert!(runner.run().success());

        assert_eq!(
            *outcomes.lock().unwrap(),
            vec![InstrumentOutcome::Emitted, InstrumentOutcome::PassedThrough]
        );
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_wrapper_handle_is_registered_synthetic() {
        let (interceptor, _) = interceptor();
        let roles = Arc::new(Mutex::new(Vec::new()));
        let mut runner = runner();

        let (i, r) = (Arc::clone(&interceptor), Arc::clone(&roles));
        runner.add_test("Roles", move |case| {
            i.maybe_instrument(case, Location::caller(), |wrapper| {
                let scoped = i.scope(wrapper);
                r.lock().unwrap().push(scoped.record().map(|rec| rec.role));
                assert_eq!(wrapper.name(), "Roles/*&");
            });
            r.lock().unwrap().push(i.scope(case).record().map(|rec| rec.role));
        });
        assert!(runner.run().success());

        assert_eq!(
            *roles.lock().unwrap(),
            vec![Some(RecordRole::Synthetic), Some(RecordRole::Origin)]
        );
    }

    #[test]
    fn test_nested_runs_make_a_composite() {
        let (interceptor, backend) = interceptor();
        let outcome = Arc::new(Mutex::new(None));
        let mut runner = runner();

        let (i, o) = (Arc::clone(&interceptor), Arc::clone(&outcome));
        runner.add_test("Parent", move |case| {
            let result = i.maybe_instrument(case, Location::caller(), |wrapper| {
                let scoped = i.scope(wrapper);
                scoped.run("first", |_| {});
                scoped.run("second", |_| {});
            });
            *o.lock().unwrap() = Some(result);
        });
        assert!(runner.run().success());

        assert_eq!(*outcome.lock().unwrap(), Some(InstrumentOutcome::Composite));
        let mut names: Vec<_> = backend.spans().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, vec!["Parent/first", "Parent/second"]);
    }

    #[test]
    fn test_failure_reaches_claimed_handle() {
        let (interceptor, backend) = interceptor();
        let mut runner = runner();

        let i = Arc::clone(&interceptor);
        runner.add_test("Failing", move |case| {
            i.maybe_instrument(case, Location::caller(), |wrapper| wrapper.fail());
        });
        let summary = runner.run();

        assert_eq!(summary.failed, vec!["Failing"]);
        assert_eq!(
            backend.named("Failing")[0].tag("test.status"),
            Some(&TagValue::from("FAIL"))
        );
    }

    #[test]
    fn test_concurrent_calls_on_one_handle_instrument_once() {
        let (interceptor, backend) = interceptor();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let mut runner = runner();

        let (i, o) = (Arc::clone(&interceptor), Arc::clone(&outcomes));
        runner.add_test("Raced", move |case| {
            let here = Location::caller();
            std::thread::scope(|scope| {
                for _ in 0..2 {
                    scope.spawn(|| {
                        let outcome = i.maybe_instrument(case, here, |_| {});
                        o.lock().unwrap().push(outcome);
                    });
                }
            });
        });
        assert!(runner.run().success());

        let outcomes = outcomes.lock().unwrap().clone();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == InstrumentOutcome::Emitted)
                .count(),
            1
        );
        assert!(outcomes.contains(&InstrumentOutcome::PassedThrough));
        assert_eq!(backend.named("Raced").len(), 1);
    }

    #[test]
    fn test_unfinished_wrapper_is_skipped() {
        let (interceptor, backend) = interceptor();
        let outcome = Arc::new(Mutex::new(None));
        let mut runner = runner();

        let (i, o) = (Arc::clone(&interceptor), Arc::clone(&outcome));
        runner.add_test("StillRunning", move |case| {
            let skipped_before = RESULT_UNAVAILABLE.get();
            let site = CallSite::from(Location::caller());
            let result = i.report(case, case, &site, SystemTime::now());
            assert!(RESULT_UNAVAILABLE.get() > skipped_before);
            *o.lock().unwrap() = Some(result);
        });
        assert!(runner.run().success());

        assert_eq!(*outcome.lock().unwrap(), Some(InstrumentOutcome::Skipped));
        assert!(backend.is_empty());
    }
}
