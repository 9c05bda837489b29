//! Transaction Ordering Tests
//!
//! Lifecycle calls reach the metadata store, then the primary store, then
//! each partition in table order. Commit, abort and read-unlock run in the
//! exact reverse. A failed start or read-lock releases what it took.

mod common;

use common::Cluster;
use dirpart::backend::{StoreCall, TransactionalStore};
use dirpart::error::{DirectoryError, ErrorKind};

const ROOTS: &[&str] = &["dc=p1", "dc=p2", "dc=p3", "dc=p4", "dc=p5"];

fn forward() -> Vec<&'static str> {
    vec!["metadata", "primary", "dc=p1", "dc=p2", "dc=p3", "dc=p4", "dc=p5"]
}

fn reverse() -> Vec<&'static str> {
    let mut order = forward();
    order.reverse();
    order
}

// =============================================================================
// ACQUISITION ORDER
// =============================================================================

/// Test: start and prepare visit metadata, primary, then partitions in order.
#[test]
fn test_start_and_prepare_order() {
    let c = Cluster::new(ROOTS);
    c.module.start_transaction().unwrap();
    c.module.prepare_commit().unwrap();
    c.module.end_transaction().unwrap();

    assert_eq!(c.journal.stores_for(StoreCall::StartTransaction), forward());
    assert_eq!(c.journal.stores_for(StoreCall::PrepareCommit), forward());
}

/// Test: commit releases in the exact reverse of acquisition.
#[test]
fn test_commit_releases_in_reverse() {
    let c = Cluster::new(ROOTS);
    c.module.start_transaction().unwrap();
    c.module.end_transaction().unwrap();
    assert_eq!(c.journal.stores_for(StoreCall::EndTransaction), reverse());
    assert_eq!(c.module.transaction_depth(), 0);
}

/// Test: abort releases in the exact reverse of acquisition.
#[test]
fn test_abort_releases_in_reverse() {
    let c = Cluster::new(ROOTS);
    c.module.start_transaction().unwrap();
    c.module.delete_transaction().unwrap();
    assert_eq!(c.journal.stores_for(StoreCall::DeleteTransaction), reverse());
    assert_eq!(c.module.transaction_depth(), 0);
}

// =============================================================================
// UNWIND
// =============================================================================

/// Test: start failing at the third of five partitions releases partitions
/// two and one, then the primary and metadata stores, and leaves the depth
/// unchanged.
#[test]
fn test_start_failure_unwinds_acquired_prefix() {
    let c = Cluster::new(ROOTS);
    c.backend("dc=p3")
        .failpoints()
        .arm(StoreCall::StartTransaction, DirectoryError::busy("dc=p3 locked"));

    let err = c.module.start_transaction().unwrap_err();
    assert_eq!(err, DirectoryError::busy("dc=p3 locked"));
    assert_eq!(c.module.transaction_depth(), 0);

    assert_eq!(
        c.journal.stores_for(StoreCall::StartTransaction),
        vec!["metadata", "primary", "dc=p1", "dc=p2", "dc=p3"]
    );
    assert_eq!(
        c.journal.stores_for(StoreCall::DeleteTransaction),
        vec!["dc=p2", "dc=p1", "primary", "metadata"]
    );

    assert_eq!(c.metadata.transaction_depth(), 0);
    assert_eq!(c.primary.transaction_depth(), 0);
    for root in ROOTS {
        assert_eq!(c.backend(root).transaction_depth(), 0, "{} left open", root);
    }
    assert_eq!(c.module.metrics().snapshot().unwinds, 1);
}

/// Test: A metadata failure unwinds nothing because nothing was acquired.
#[test]
fn test_start_failure_at_metadata() {
    let c = Cluster::new(ROOTS);
    c.metadata
        .failpoints()
        .arm(StoreCall::StartTransaction, DirectoryError::busy("metadata"));

    assert!(c.module.start_transaction().is_err());
    assert!(c.journal.calls(StoreCall::DeleteTransaction).is_empty());
    assert_eq!(c.module.metrics().snapshot().unwinds, 0);
}

/// Test: read_lock failing part way unlocks what it locked, in reverse.
#[test]
fn test_read_lock_failure_unwinds() {
    let c = Cluster::new(ROOTS);
    c.backend("dc=p4")
        .failpoints()
        .arm(StoreCall::ReadLock, DirectoryError::busy("writer active"));

    assert!(c.module.read_lock().is_err());
    assert_eq!(
        c.journal.stores_for(StoreCall::ReadUnlock),
        vec!["dc=p3", "dc=p2", "dc=p1", "primary", "metadata"]
    );
    assert_eq!(c.metadata.read_lock_count(), 0);
    for root in ROOTS {
        assert_eq!(c.backend(root).read_lock_count(), 0);
    }
}

/// Test: read locks are independent of the transaction depth.
#[test]
fn test_read_lock_round_trip_order() {
    let c = Cluster::new(ROOTS);
    c.module.read_lock().unwrap();
    assert_eq!(c.module.transaction_depth(), 0);
    c.module.read_unlock().unwrap();
    assert_eq!(c.journal.stores_for(StoreCall::ReadLock), forward());
    assert_eq!(c.journal.stores_for(StoreCall::ReadUnlock), reverse());
}

// =============================================================================
// RELEASE FAILURES AND MISMATCH
// =============================================================================

/// Test: A failing store does not stop the other releases; the first
/// error is returned.
#[test]
fn test_end_attempts_every_store() {
    let c = Cluster::new(ROOTS);
    c.module.start_transaction().unwrap();
    c.backend("dc=p4")
        .failpoints()
        .arm(StoreCall::EndTransaction, DirectoryError::unavailable("disk full"));
    c.backend("dc=p2")
        .failpoints()
        .arm(StoreCall::EndTransaction, DirectoryError::busy("second"));

    let err = c.module.end_transaction().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(c.journal.stores_for(StoreCall::EndTransaction), reverse());
    assert_eq!(c.module.transaction_depth(), 0);
    assert_eq!(c.primary.transaction_depth(), 0);
    assert_eq!(c.metadata.transaction_depth(), 0);
}

/// Test: Commit without a transaction is a consistency error, and the
/// release calls still happen.
#[test]
fn test_unbalanced_commit_reports_mismatch() {
    let c = Cluster::new(ROOTS);
    let err = c.module.end_transaction().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionMismatch);
    assert_eq!(c.journal.stores_for(StoreCall::EndTransaction), reverse());
    assert_eq!(c.module.transaction_depth(), 0);
}

/// Test: Nested transactions need one release per start.
#[test]
fn test_nested_depth() {
    let c = Cluster::new(ROOTS);
    c.module.start_transaction().unwrap();
    c.module.start_transaction().unwrap();
    assert_eq!(c.module.transaction_depth(), 2);
    c.module.end_transaction().unwrap();
    assert_eq!(c.module.transaction_depth(), 1);
    c.module.end_transaction().unwrap();
    assert_eq!(c.module.transaction_depth(), 0);
    assert_eq!(c.module.metrics().snapshot().transactions_committed, 2);
}
