//! Runner - declared case tables and top-level execution
//!
//! The runner holds the declared top-level tests and benchmarks of one suite
//! and executes them, tests first, across a fixed pool of worker threads.
//! Two hook points let instrumentation observe execution without the case
//! functions knowing about it:
//!
//! - [`Runner::wrap_declared`] rewrites the declared tables before the run
//!   (registration-time wrapping of top-level entries)
//! - [`Runner::install_nested_hook`] routes every `Case::run` through a
//!   [`NestedRunHook`] (interception of nested cases)

use std::panic::Location;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{info, warn};

use super::bench::BenchTarget;
use super::case::{Case, CaseKind, RunnerContext};
use super::hook::{HookError, NestedRunHook};

/// A declared case body
pub type CaseFn = Arc<dyn Fn(&Case) + Send + Sync>;

/// One entry of the runner's declared tables
#[derive(Clone)]
pub struct Declaration {
    pub name: String,
    pub kind: CaseKind,
    pub func: CaseFn,
    /// Where the case was declared
    pub location: &'static Location<'static>,
    /// Type path of the declared body, e.g. `suite::fixtures::sort_case`
    pub function: &'static str,
}

impl std::fmt::Debug for Declaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("function", &self.function)
            .finish()
    }
}

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker threads for top-level cases
    pub parallelism: usize,
    /// Iteration policy for benchmark loops
    pub bench_target: BenchTarget,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            bench_target: BenchTarget::default(),
        }
    }
}

/// Pass/fail of every top-level case, in declaration order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

/// Host runner for one suite of declared tests and benchmarks
pub struct Runner {
    context: Arc<RunnerContext>,
    config: RunnerConfig,
    tests: Vec<Declaration>,
    benchmarks: Vec<Declaration>,
}

impl Runner {
    pub fn new(suite: impl Into<String>) -> Self {
        Self::with_config(suite, RunnerConfig::default())
    }

    pub fn with_config(suite: impl Into<String>, config: RunnerConfig) -> Self {
        Self {
            context: Arc::new(RunnerContext::new(suite, config.bench_target)),
            config,
            tests: Vec::new(),
            benchmarks: Vec::new(),
        }
    }

    pub fn suite(&self) -> &str {
        &self.context.suite
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Declare a top-level test
    #[track_caller]
    pub fn add_test<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Case) + Send + Sync + 'static,
    {
        let declaration = Declaration {
            name: name.to_string(),
            kind: CaseKind::Test,
            func: Arc::new(f),
            location: Location::caller(),
            function: std::any::type_name::<F>(),
        };
        self.tests.push(declaration);
        self
    }

    /// Declare a top-level benchmark
    #[track_caller]
    pub fn add_benchmark<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Case) + Send + Sync + 'static,
    {
        let declaration = Declaration {
            name: name.to_string(),
            kind: CaseKind::Benchmark,
            func: Arc::new(f),
            location: Location::caller(),
            function: std::any::type_name::<F>(),
        };
        self.benchmarks.push(declaration);
        self
    }

    /// Declared tests followed by declared benchmarks
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.tests.iter().chain(self.benchmarks.iter())
    }

    /// Replace every declared entry with `wrap(entry)`
    pub fn wrap_declared<W>(&mut self, mut wrap: W)
    where
        W: FnMut(Declaration) -> Declaration,
    {
        let tests = std::mem::take(&mut self.tests);
        let benchmarks = std::mem::take(&mut self.benchmarks);
        self.tests = tests.into_iter().map(&mut wrap).collect();
        self.benchmarks = benchmarks.into_iter().map(&mut wrap).collect();
    }

    /// Route every `Case::run` of this runner through `hook`
    pub fn install_nested_hook(&self, hook: Arc<dyn NestedRunHook>) -> Result<(), HookError> {
        self.context.install_hook(hook)
    }

    pub fn has_nested_hook(&self) -> bool {
        self.context.has_hook()
    }

    /// Execute all declared tests, then all declared benchmarks
    pub fn run(&self) -> RunSummary {
        self.context.mark_started();

        let mut summary = RunSummary::default();
        self.run_table(&self.tests, &mut summary);
        self.run_table(&self.benchmarks, &mut summary);

        info!(
            suite = %self.suite(),
            passed = summary.passed.len(),
            failed = summary.failed.len(),
            "Run complete"
        );
        summary
    }

    fn run_table(&self, table: &[Declaration], summary: &mut RunSummary) {
        if table.is_empty() {
            return;
        }

        let workers = self.config.parallelism.clamp(1, table.len());
        let mut results: Vec<(usize, String, bool)> = if workers == 1 {
            table
                .iter()
                .enumerate()
                .map(|(index, decl)| (index, decl.name.clone(), self.run_declaration(decl)))
                .collect()
        } else {
            let next = AtomicUsize::new(0);
            let collected = Mutex::new(Vec::with_capacity(table.len()));
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(decl) = table.get(index) else {
                            break;
                        };
                        let passed = self.run_declaration(decl);
                        collected
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((index, decl.name.clone(), passed));
                    });
                }
            });
            collected.into_inner().unwrap_or_else(PoisonError::into_inner)
        };

        results.sort_by_key(|(index, _, _)| *index);
        for (_, name, passed) in results {
            if passed {
                summary.passed.push(name);
            } else {
                summary.failed.push(name);
            }
        }
    }

    fn run_declaration(&self, decl: &Declaration) -> bool {
        let case = Case::root(&decl.name, decl.kind, Arc::clone(&self.context));
        let func = Arc::clone(&decl.func);
        case.execute(|c| func(c));

        let passed = !case.failed();
        if passed {
            info!(case = %case.name(), kind = decl.kind.as_str(), "ok");
        } else {
            warn!(case = %case.name(), kind = decl.kind.as_str(), "FAILED");
        }
        passed
    }
}
