//! Instrumentation registry
//!
//! Process-lifetime table from case identity to the record created when the
//! case was instrumented. Membership is set-once: `add_record` never
//! overwrites, and reports whether it inserted, so two callers racing to
//! instrument the same case agree on a single winner.
//!
//! The lock is held only for the lookup or insert itself, never while a case
//! body runs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use crate::metrics::REGISTRY_RECORDS;
use crate::runner::CaseId;

/// Why a case is in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRole {
    /// Case claimed by the interception layer
    Origin,
    /// Wrapper level injected under an origin case
    Synthetic,
}

/// Created exactly once per instrumented case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentationRecord {
    pub case_id: CaseId,
    /// Wall clock captured before the case body ran
    pub started_at: SystemTime,
    pub role: RecordRole,
}

impl InstrumentationRecord {
    pub fn origin(case_id: CaseId, started_at: SystemTime) -> Self {
        Self {
            case_id,
            started_at,
            role: RecordRole::Origin,
        }
    }

    pub fn synthetic(case_id: CaseId, started_at: SystemTime) -> Self {
        Self {
            case_id,
            started_at,
            role: RecordRole::Synthetic,
        }
    }
}

/// Concurrency-safe set-once map of instrumented cases
#[derive(Debug, Default)]
pub struct InstrumentationRegistry {
    records: RwLock<HashMap<CaseId, InstrumentationRecord>>,
}

impl InstrumentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_record(&self, case_id: CaseId) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&case_id)
    }

    /// Insert `record` unless its case is already present.
    ///
    /// Returns `true` if this call inserted it.
    pub fn add_record(&self, record: InstrumentationRecord) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.case_id) {
            return false;
        }
        records.insert(record.case_id, record);
        REGISTRY_RECORDS.inc();
        true
    }

    pub fn get_record(&self, case_id: CaseId) -> Option<InstrumentationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&case_id)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{Case, Runner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn some_case_ids(n: usize) -> Vec<CaseId> {
        let ids = Arc::new(Mutex::new(Vec::new()));
        let mut runner = Runner::new("registry");
        for i in 0..n {
            let ids = Arc::clone(&ids);
            runner.add_test(&format!("Test{}", i), move |case: &Case| {
                ids.lock().unwrap().push(case.id());
            });
        }
        runner.run();
        let ids = ids.lock().unwrap().clone();
        ids
    }

    #[test]
    fn test_set_once() {
        let registry = InstrumentationRegistry::new();
        let id = some_case_ids(1)[0];
        let first = SystemTime::now();

        assert!(!registry.has_record(id));
        assert!(registry.add_record(InstrumentationRecord::origin(id, first)));
        assert!(!registry.add_record(InstrumentationRecord::synthetic(id, SystemTime::now())));

        let record = registry.get_record(id).unwrap();
        assert_eq!(record.started_at, first);
        assert_eq!(record.role, RecordRole::Origin);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_have_one_winner() {
        let registry = InstrumentationRegistry::new();
        let id = some_case_ids(1)[0];
        let winners = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if registry.add_record(InstrumentationRecord::origin(id, SystemTime::now())) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_cases_are_independent() {
        let registry = InstrumentationRegistry::new();
        let ids = some_case_ids(3);
        for id in &ids {
            assert!(registry.add_record(InstrumentationRecord::origin(*id, SystemTime::now())));
        }
        assert_eq!(registry.len(), 3);
        assert!(registry.get_record(ids[1]).is_some());
    }
}
