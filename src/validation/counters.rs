//! Per-run violation counters
//!
//! - Counters only, one per rule
//! - Monotonic within a run; a new run gets a fresh set
//! - Safe to bump from validation worker threads

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::outcome::ViolationRule;

/// Violation counters indexed by rule.
///
/// Relaxed ordering is enough: counts are read after the parallel
/// validation pass has joined.
#[derive(Debug, Default)]
pub struct ViolationCounters {
    by_rule: [AtomicU64; ViolationRule::ALL.len()],
    records_checked: AtomicU64,
    records_rejected: AtomicU64,
}

impl ViolationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, rule: ViolationRule) {
        self.by_rule[rule.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checked(&self, rejected: bool) {
        self.records_checked.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.records_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, rule: ViolationRule) -> u64 {
        self.by_rule[rule.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            by_rule: ViolationRule::ALL
                .iter()
                .map(|rule| (rule.as_str().to_string(), self.count(*rule)))
                .filter(|(_, n)| *n > 0)
                .collect(),
            records_checked: self.records_checked.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot; rules with zero hits are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CountersSnapshot {
    pub by_rule: BTreeMap<String, u64>,
    pub records_checked: u64,
    pub records_rejected: u64,
}

impl CountersSnapshot {
    pub fn total_violations(&self) -> u64 {
        self.by_rule.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = ViolationCounters::new();
        for rule in ViolationRule::ALL {
            assert_eq!(counters.count(rule), 0);
        }
        assert_eq!(counters.snapshot().total_violations(), 0);
    }

    #[test]
    fn test_increment_and_snapshot() {
        let counters = ViolationCounters::new();
        counters.increment(ViolationRule::Range);
        counters.increment(ViolationRule::Range);
        counters.increment(ViolationRule::Missing);
        counters.record_checked(true);
        counters.record_checked(false);

        let snap = counters.snapshot();
        assert_eq!(snap.by_rule.get("range"), Some(&2));
        assert_eq!(snap.by_rule.get("missing"), Some(&1));
        assert!(!snap.by_rule.contains_key("type"));
        assert_eq!(snap.records_checked, 2);
        assert_eq!(snap.records_rejected, 1);
        assert_eq!(snap.total_violations(), 3);
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = std::sync::Arc::new(ViolationCounters::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.increment(ViolationRule::Type);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counters.count(ViolationRule::Type), 4000);
    }
}
