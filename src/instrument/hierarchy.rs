//! Hierarchy resolution
//!
//! The interception layer runs every instrumented case one level deeper,
//! under a child named [`MARKER_SEGMENT`]. The runner therefore names a leaf
//! declared as `Outer/Inner` something like `Outer/*&/Inner/*&`. Resolution
//! drops every marker segment so the reported name is the one the developer
//! wrote, no matter how many levels were wrapped.

use crate::runner::{Case, SEPARATOR};

/// Reserved name of the synthetic wrapper level
pub const MARKER_SEGMENT: &str = "*&";

/// Logical name of a raw runner name: all marker segments removed
pub fn resolve(raw_name: &str) -> String {
    raw_name
        .split(SEPARATOR)
        .filter(|segment| *segment != MARKER_SEGMENT)
        .collect::<Vec<_>>()
        .join(SEPARATOR.to_string().as_str())
}

/// Declared top-level function of a logical name (its first segment)
pub fn function_name(logical_name: &str) -> &str {
    logical_name
        .split(SEPARATOR)
        .next()
        .unwrap_or(logical_name)
}

/// Whether `case` is a wrapper level injected by the interception layer
pub fn is_synthetic(case: &Case) -> bool {
    case.name().rsplit(SEPARATOR).next() == Some(MARKER_SEGMENT)
}

/// Nearest ancestor of `case` that is not a synthetic level
pub fn logical_parent(case: &Case) -> Option<&Case> {
    let mut parent = case.parent();
    while let Some(candidate) = parent {
        if !is_synthetic(candidate) {
            return Some(candidate);
        }
        parent = candidate.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_resolve_strips_every_marker() {
        assert_eq!(resolve("BenchmarkSort/*&"), "BenchmarkSort");
        assert_eq!(resolve("A/*&/B/*&/C/*&"), "A/B/C");
        assert_eq!(resolve("A/*&/*&/B"), "A/B");
    }

    #[test]
    fn test_resolve_without_marker_is_identity() {
        assert_eq!(resolve("TestPlain"), "TestPlain");
        assert_eq!(resolve("TestPlain/sub_case"), "TestPlain/sub_case");
    }

    #[test]
    fn test_marker_must_be_a_whole_segment() {
        assert_eq!(resolve("A/x*&/B"), "A/x*&/B");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let once = resolve("A/*&/B/*&");
        assert_eq!(resolve(&once), once);
    }

    #[test]
    fn test_user_case_named_like_marker_is_dropped() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let mut runner = Runner::new("hierarchy");
        let slot = Arc::clone(&names);
        runner.add_test("Outer", move |outer| {
            outer.run("*&", |odd| {
                odd.run("leaf", |leaf| {
                    slot.lock().unwrap().push(leaf.name().to_string());
                });
            });
        });
        assert!(runner.run().success());

        let raw = names.lock().unwrap()[0].clone();
        assert_eq!(raw, "Outer/*&/leaf");
        assert_eq!(resolve(&raw), "Outer/leaf");
    }

    #[test]
    fn test_function_name() {
        assert_eq!(function_name("BenchmarkSort/small/100"), "BenchmarkSort");
        assert_eq!(function_name("TestSolo"), "TestSolo");
    }

    #[test]
    fn test_logical_parent_skips_synthetic_levels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut runner = Runner::new("hierarchy");
        let slot = Arc::clone(&seen);
        runner.add_test("Outer", move |outer| {
            outer.run_native(MARKER_SEGMENT, |wrapper| {
                assert!(is_synthetic(wrapper));
                wrapper.run_native("Inner", |inner| {
                    assert!(!is_synthetic(inner));
                    let parent = logical_parent(inner).map(|p| p.name().to_string());
                    slot.lock().unwrap().push((inner.name().to_string(), parent));
                });
            });
        });
        assert!(runner.run().success());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![("Outer/*&/Inner".to_string(), Some("Outer".to_string()))]
        );
        assert_eq!(resolve(&seen[0].0), "Outer/Inner");
    }
}
