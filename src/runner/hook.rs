//! Nested-run hook capability
//!
//! `Case::run` consults the hook installed on its runner before executing a
//! nested case. Whoever owns the hook sees every `(parent, name, caller, f)`
//! call and decides how the child runs.

use std::panic::Location;

use super::case::Case;

/// Intercepts `Case::run` calls on a runner
pub trait NestedRunHook: Send + Sync {
    /// Run `f` as a nested case `name` under `parent`.
    ///
    /// Implementations must invoke `f` exactly once and must create the child
    /// through [`Case::run_native`], which never re-enters the hook. The
    /// return value is the child's pass/fail, as `Case::run` reports it.
    fn run_nested(
        &self,
        parent: &Case,
        name: &str,
        caller: &'static Location<'static>,
        f: &mut dyn FnMut(&Case),
    ) -> bool;
}

/// Error installing a nested-run hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// Another hook owns the nested-run entry point
    AlreadyInstalled,
    /// The runner has begun executing cases
    RunnerStarted,
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookError::AlreadyInstalled => write!(f, "Nested-run hook already installed"),
            HookError::RunnerStarted => {
                write!(f, "Nested-run hook cannot be installed after the runner started")
            }
        }
    }
}

impl std::error::Error for HookError {}
