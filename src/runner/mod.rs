//! Host runner shim
//!
//! Minimal test/benchmark runner that exposes the post-run bookkeeping the
//! instrumentation reads: case identity, hierarchy, child counts, and
//! recorded outcomes. It also provides the two hook points instrumentation
//! attaches to (declared-table wrapping and nested-run interception).
//!
//! # Modules
//!
//! - `case` - case handles and recorded outcomes
//! - `bench` - benchmark timing loop
//! - `alloc` - allocation counting global allocator
//! - `hook` - nested-run hook capability
//! - `harness` - declared tables and top-level execution

pub mod alloc;
pub mod bench;
pub mod case;
pub mod harness;
pub mod hook;

pub use alloc::{AllocSnapshot, CountingAllocator};
pub use bench::{BenchTarget, BenchmarkResult};
pub use case::{Case, CaseId, CaseKind, CaseOutcome, SEPARATOR};
pub use harness::{CaseFn, Declaration, RunSummary, Runner, RunnerConfig};
pub use hook::{HookError, NestedRunHook};
