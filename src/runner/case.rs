//! Case handles
//!
//! A [`Case`] is one node of the runner's test/benchmark tree. It is the
//! invocation handle the instrumentation works with: identity (`CaseId`),
//! hierarchical name, parent link, live child count, and once the case has
//! finished, its recorded [`CaseOutcome`]. Everything the instrumentation
//! needs from the runner is read through these public accessors.
//!
//! ```text
//! Runner ──► Case "Outer" ──run("Inner")──► Case "Outer/Inner"
//!                 │                               │
//!                 │◄──── failure propagates ──────┘
//!                 ▼
//!            CaseOutcome { elapsed, passed, benchmark }
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::bench::{self, BenchTarget, BenchmarkResult};
use super::hook::{HookError, NestedRunHook};

/// Separator between hierarchy levels in a case name
pub const SEPARATOR: char = '/';

static NEXT_CASE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId(u64);

impl CaseId {
    fn next() -> Self {
        CaseId(NEXT_CASE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "case-{}", self.0)
    }
}

/// Whether a case is a test or a benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseKind {
    Test,
    Benchmark,
}

impl CaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseKind::Test => "test",
            CaseKind::Benchmark => "benchmark",
        }
    }
}

/// What the runner recorded when a case finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseOutcome {
    /// Wall time for tests, timed loop duration for benchmarks
    pub elapsed: Duration,
    pub passed: bool,
    /// Present for benchmark cases only
    pub benchmark: Option<BenchmarkResult>,
}

/// State shared by every case of one runner
pub(crate) struct RunnerContext {
    pub(crate) suite: String,
    pub(crate) bench_target: BenchTarget,
    hook: RwLock<Option<Arc<dyn NestedRunHook>>>,
    started: AtomicBool,
}

impl RunnerContext {
    pub(crate) fn new(suite: impl Into<String>, bench_target: BenchTarget) -> Self {
        Self {
            suite: suite.into(),
            bench_target,
            hook: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn install_hook(&self, hook: Arc<dyn NestedRunHook>) -> Result<(), HookError> {
        if self.started.load(Ordering::Acquire) {
            return Err(HookError::RunnerStarted);
        }
        let mut slot = self.hook.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(HookError::AlreadyInstalled);
        }
        *slot = Some(hook);
        Ok(())
    }

    pub(crate) fn has_hook(&self) -> bool {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn nested_hook(&self) -> Option<Arc<dyn NestedRunHook>> {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }
}

/// Handle onto one test or benchmark invocation
#[derive(Clone)]
pub struct Case {
    state: Arc<CaseState>,
}

struct CaseState {
    id: CaseId,
    name: String,
    kind: CaseKind,
    parent: Option<Case>,
    context: Arc<RunnerContext>,
    sub_count: AtomicUsize,
    failed: AtomicBool,
    finished: AtomicBool,
    bench_result: Mutex<Option<BenchmarkResult>>,
    outcome: Mutex<Option<CaseOutcome>>,
}

impl Case {
    pub(crate) fn root(name: &str, kind: CaseKind, context: Arc<RunnerContext>) -> Self {
        Self::with_parent(rewrite_name(name), kind, None, context)
    }

    fn with_parent(
        name: String,
        kind: CaseKind,
        parent: Option<Case>,
        context: Arc<RunnerContext>,
    ) -> Self {
        Self {
            state: Arc::new(CaseState {
                id: CaseId::next(),
                name,
                kind,
                parent,
                context,
                sub_count: AtomicUsize::new(0),
                failed: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                bench_result: Mutex::new(None),
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> CaseId {
        self.state.id
    }

    /// Full hierarchical name, levels joined by [`SEPARATOR`]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn kind(&self) -> CaseKind {
        self.state.kind
    }

    /// Suite (package) the case was declared in
    pub fn suite(&self) -> &str {
        &self.state.context.suite
    }

    pub fn parent(&self) -> Option<&Case> {
        self.state.parent.as_ref()
    }

    /// Number of nested cases started under this one so far
    pub fn child_count(&self) -> usize {
        self.state.sub_count.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> bool {
        self.state.failed.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }

    /// Recorded outcome; `None` until the case has finished
    pub fn outcome(&self) -> Option<CaseOutcome> {
        if !self.is_finished() {
            return None;
        }
        *lock(&self.state.outcome)
    }

    /// Mark this case and all its ancestors failed
    pub fn fail(&self) {
        self.state.failed.store(true, Ordering::Release);
        if let Some(parent) = self.parent() {
            parent.fail();
        }
    }

    /// Log an error and fail the case
    pub fn error(&self, message: impl std::fmt::Display) {
        warn!(case = %self.name(), "{}", message);
        self.fail();
    }

    pub fn log(&self, message: impl std::fmt::Display) {
        info!(case = %self.name(), "{}", message);
    }

    /// Time `body` as this benchmark's measured loop.
    ///
    /// N comes from the runner's [`BenchTarget`]. Calling `iter` again
    /// replaces the previous measurement.
    pub fn iter<R, F>(&self, mut body: F)
    where
        F: FnMut() -> R,
    {
        let result = bench::measure(self.state.context.bench_target, &mut body);
        *lock(&self.state.bench_result) = Some(result);
    }

    /// Run `f` as nested case `name`, through the runner's nested-run hook
    /// when one is installed. Returns whether the nested case passed.
    ///
    /// The name `*&` is reserved for the instrumentation wrapper level. A
    /// nested case given that exact name runs normally but the segment is
    /// dropped from its reported name.
    #[track_caller]
    pub fn run<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&Case),
    {
        let caller = Location::caller();
        match self.state.context.nested_hook() {
            Some(hook) => {
                let mut f = Some(f);
                let mut call = |case: &Case| {
                    if let Some(f) = f.take() {
                        f(case)
                    }
                };
                hook.run_nested(self, name, caller, &mut call)
            }
            None => self.run_native(name, f),
        }
    }

    /// Run `f` as nested case `name` without consulting the hook.
    ///
    /// Same naming rules as [`run`](Self::run), `*&` included.
    pub fn run_native<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&Case),
    {
        self.state.sub_count.fetch_add(1, Ordering::AcqRel);

        let full_name = format!("{}{}{}", self.name(), SEPARATOR, rewrite_name(name));
        let child = Case::with_parent(
            full_name,
            self.kind(),
            Some(self.clone()),
            Arc::clone(&self.state.context),
        );
        child.execute(f);
        !child.failed()
    }

    /// Run the case body, catch panics as failures, and record the outcome
    pub(crate) fn execute<F>(&self, f: F)
    where
        F: FnOnce(&Case),
    {
        let start = Instant::now();
        let run = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
        let wall = start.elapsed();

        if let Err(payload) = run {
            self.error(format!("panicked: {}", panic_message(payload.as_ref())));
        }

        let benchmark = match self.kind() {
            CaseKind::Test => None,
            CaseKind::Benchmark => Some(lock(&self.state.bench_result).take().unwrap_or(
                BenchmarkResult {
                    iterations: 1,
                    elapsed: wall,
                    ..Default::default()
                },
            )),
        };

        *lock(&self.state.outcome) = Some(CaseOutcome {
            elapsed: benchmark.map(|b| b.elapsed).unwrap_or(wall),
            passed: !self.failed(),
            benchmark,
        });
        self.state.finished.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Case {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Case")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("children", &self.child_count())
            .field("failed", &self.failed())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Whitespace in a case name becomes `_`
fn rewrite_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<RunnerContext> {
        Arc::new(RunnerContext::new("suite", BenchTarget::Iterations(10)))
    }

    #[test]
    fn test_nested_names_and_children() {
        let root = Case::root("Outer", CaseKind::Test, context());
        root.execute(|case| {
            assert!(case.run("first inner", |inner| {
                assert_eq!(inner.name(), "Outer/first_inner");
                assert_eq!(inner.parent().map(|p| p.id()), Some(case.id()));
            }));
            case.run("second", |_| {});
        });

        assert!(!root.failed());
        assert_eq!(root.child_count(), 2);
        assert!(root.is_finished());
        assert_eq!(root.suite(), "suite");
    }

    #[test]
    fn test_failure_propagates_to_ancestors() {
        let root = Case::root("Outer", CaseKind::Test, context());
        let mut inner_passed = true;
        root.execute(|case| {
            case.run("Mid", |mid| {
                inner_passed = mid.run("Leaf", |leaf| leaf.fail());
            });
        });

        assert!(!inner_passed);
        assert!(root.failed());
        assert_eq!(root.outcome().map(|o| o.passed), Some(false));
    }

    #[test]
    fn test_panic_is_recorded_as_failure() {
        let root = Case::root("Panics", CaseKind::Test, context());
        root.execute(|_| panic!("boom"));

        assert!(root.failed());
        assert!(root.is_finished());
    }

    #[test]
    fn test_outcome_unavailable_while_running() {
        let root = Case::root("Running", CaseKind::Test, context());
        root.execute(|case| {
            assert!(case.outcome().is_none());
        });
        assert!(!root.failed());
        assert!(root.outcome().is_some());
    }

    #[test]
    fn test_benchmark_outcome() {
        let root = Case::root("BenchLoop", CaseKind::Benchmark, context());
        root.execute(|case| case.iter(|| 2 + 2));

        let bench = root.outcome().and_then(|o| o.benchmark).unwrap();
        assert_eq!(bench.iterations, 10);

        let bare = Case::root("BenchBare", CaseKind::Benchmark, context());
        bare.execute(|_| {});
        assert_eq!(bare.outcome().and_then(|o| o.benchmark).unwrap().iterations, 1);
    }

    #[test]
    fn test_hook_rejected_after_start() {
        struct Passthrough;
        impl NestedRunHook for Passthrough {
            fn run_nested(
                &self,
                parent: &Case,
                name: &str,
                _caller: &'static Location<'static>,
                f: &mut dyn FnMut(&Case),
            ) -> bool {
                parent.run_native(name, |c| f(c))
            }
        }

        let ctx = context();
        assert!(ctx.install_hook(Arc::new(Passthrough)).is_ok());
        assert_eq!(
            ctx.install_hook(Arc::new(Passthrough)),
            Err(HookError::AlreadyInstalled)
        );

        let late = Arc::new(RunnerContext::new("suite", BenchTarget::Iterations(1)));
        late.mark_started();
        assert_eq!(
            late.install_hook(Arc::new(Passthrough)),
            Err(HookError::RunnerStarted)
        );
    }
}
