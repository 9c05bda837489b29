//! Partition-layer counters
//!
//! - Counters only, monotonic, reset only when the registry is created
//! - Relaxed atomics; exact values, no ordering guarantees between counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of operational counters.
///
/// One registry belongs to one `PartitionModule`; share it by `Arc` to
/// read the counters from elsewhere.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Requests sent straight to one partition
    routed_single: AtomicU64,
    /// Requests fanned out to several partitions
    routed_fanout: AtomicU64,
    /// Writes to special DNs
    routed_replicate: AtomicU64,
    /// Requests passed to the primary store
    routed_primary: AtomicU64,
    subrequests_dispatched: AtomicU64,
    referrals_returned: AtomicU64,
    fanout_aborts: AtomicU64,
    propagations: AtomicU64,
    propagation_failures: AtomicU64,
    multi_partition_conflicts: AtomicU64,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    unwinds: AtomicU64,
    mismatches: AtomicU64,
    partitions_created: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Routing

    pub fn increment_routed_single(&self) {
        bump(&self.routed_single);
    }

    pub fn increment_routed_fanout(&self) {
        bump(&self.routed_fanout);
    }

    pub fn increment_routed_replicate(&self) {
        bump(&self.routed_replicate);
    }

    pub fn increment_routed_primary(&self) {
        bump(&self.routed_primary);
    }

    pub fn increment_multi_partition_conflicts(&self) {
        bump(&self.multi_partition_conflicts);
    }

    // Fan-out

    pub fn increment_subrequests(&self) {
        bump(&self.subrequests_dispatched);
    }

    pub fn add_referrals(&self, count: u64) {
        self.referrals_returned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_fanout_aborts(&self) {
        bump(&self.fanout_aborts);
    }

    // Special-DN propagation

    pub fn increment_propagations(&self) {
        bump(&self.propagations);
    }

    pub fn increment_propagation_failures(&self) {
        bump(&self.propagation_failures);
    }

    // Transactions

    pub fn increment_transactions_started(&self) {
        bump(&self.transactions_started);
    }

    pub fn increment_transactions_committed(&self) {
        bump(&self.transactions_committed);
    }

    pub fn increment_transactions_aborted(&self) {
        bump(&self.transactions_aborted);
    }

    pub fn increment_unwinds(&self) {
        bump(&self.unwinds);
    }

    pub fn increment_mismatches(&self) {
        bump(&self.mismatches);
    }

    pub fn increment_partitions_created(&self) {
        bump(&self.partitions_created);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            routed_single: read(&self.routed_single),
            routed_fanout: read(&self.routed_fanout),
            routed_replicate: read(&self.routed_replicate),
            routed_primary: read(&self.routed_primary),
            subrequests_dispatched: read(&self.subrequests_dispatched),
            referrals_returned: read(&self.referrals_returned),
            fanout_aborts: read(&self.fanout_aborts),
            propagations: read(&self.propagations),
            propagation_failures: read(&self.propagation_failures),
            multi_partition_conflicts: read(&self.multi_partition_conflicts),
            transactions_started: read(&self.transactions_started),
            transactions_committed: read(&self.transactions_committed),
            transactions_aborted: read(&self.transactions_aborted),
            unwinds: read(&self.unwinds),
            mismatches: read(&self.mismatches),
            partitions_created: read(&self.partitions_created),
        }
    }

    /// Snapshot as a JSON object.
    pub fn to_json(&self) -> String {
        // A struct of plain integers always serializes
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub routed_single: u64,
    pub routed_fanout: u64,
    pub routed_replicate: u64,
    pub routed_primary: u64,
    pub subrequests_dispatched: u64,
    pub referrals_returned: u64,
    pub fanout_aborts: u64,
    pub propagations: u64,
    pub propagation_failures: u64,
    pub multi_partition_conflicts: u64,
    pub transactions_started: u64,
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    pub unwinds: u64,
    pub mismatches: u64,
    pub partitions_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_routed_single();
        registry.increment_routed_fanout();
        registry.increment_subrequests();
        registry.increment_subrequests();
        registry.add_referrals(3);
        registry.increment_transactions_started();
        registry.increment_unwinds();

        let snap = registry.snapshot();
        assert_eq!(snap.routed_single, 1);
        assert_eq!(snap.routed_fanout, 1);
        assert_eq!(snap.subrequests_dispatched, 2);
        assert_eq!(snap.referrals_returned, 3);
        assert_eq!(snap.transactions_started, 1);
        assert_eq!(snap.unwinds, 1);
        assert_eq!(snap.mismatches, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_partitions_created();
        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["partitions_created"], 1);
        assert_eq!(parsed["routed_primary"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..50 {
                        reg.increment_subrequests();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().subrequests_dispatched, 400);
    }
}
