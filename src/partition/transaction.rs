//! Transaction Coordinator
//!
//! Drives the transaction and read-lock lifecycle across the metadata
//! store, the primary store and every partition in a fixed order:
//!
//! | call                          | order                                   |
//! |-------------------------------|-----------------------------------------|
//! | start, prepare, read_lock     | metadata, primary, partitions in order  |
//! | end, delete, read_unlock      | partitions reversed, primary, metadata  |
//!
//! Readers take the metadata store's lock before anything else, and a
//! committing writer holds it until every other store has finished, so a
//! multi-partition write becomes visible all at once.
//!
//! A failed `start` or `read_lock` releases what it had acquired, in
//! reverse, before returning the original error. `end`, `delete` and
//! `read_unlock` visit every store even after a failure and return the
//! first error.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::{Backend, MetadataStore};
use crate::error::{DirResult, DirectoryError};
use crate::observability::{
    event_enabled, log_event, Event, MetricsRegistry, ObservationScope, Severity,
};

use super::table::PartitionTable;

/// Nesting depth of active transactions for one partition module.
#[derive(Debug, Default)]
pub struct TransactionState {
    depth: AtomicU32,
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    fn increment(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement if positive; false if already zero.
    fn decrement(&self) -> bool {
        self.depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Prepare,
    End,
    Delete,
    ReadLock,
    ReadUnlock,
}

impl Step {
    fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "start_transaction",
            Step::Prepare => "prepare_commit",
            Step::End => "end_transaction",
            Step::Delete => "delete_transaction",
            Step::ReadLock => "read_lock",
            Step::ReadUnlock => "read_unlock",
        }
    }
}

/// One store in lifecycle order.
#[derive(Clone, Copy)]
enum Store<'a> {
    Metadata(&'a dyn MetadataStore),
    Backend(&'a dyn Backend),
}

impl Store<'_> {
    fn label(&self) -> &str {
        match self {
            Store::Metadata(m) => m.name(),
            Store::Backend(b) => b.name(),
        }
    }

    fn call(&self, step: Step) -> DirResult<()> {
        if event_enabled(Event::TxnStep) {
            log_event(
                Event::TxnStep,
                &[("step", step.as_str()), ("store", self.label())],
            );
        }
        match self {
            Store::Metadata(m) => match step {
                Step::Start => m.start_transaction(),
                Step::Prepare => m.prepare_commit(),
                Step::End => m.end_transaction(),
                Step::Delete => m.delete_transaction(),
                Step::ReadLock => m.read_lock(),
                Step::ReadUnlock => m.read_unlock(),
            },
            Store::Backend(backend) => match step {
                Step::Start => backend.start_transaction(),
                Step::Prepare => backend.prepare_commit(),
                Step::End => backend.end_transaction(),
                Step::Delete => backend.delete_transaction(),
                Step::ReadLock => backend.read_lock(),
                Step::ReadUnlock => backend.read_unlock(),
            },
        }
    }
}

/// Coordinates lifecycle calls over one table snapshot.
pub struct TransactionCoordinator<'a> {
    metadata: &'a dyn MetadataStore,
    primary: &'a dyn Backend,
    table: &'a PartitionTable,
    state: &'a TransactionState,
    metrics: &'a MetricsRegistry,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(
        metadata: &'a dyn MetadataStore,
        primary: &'a dyn Backend,
        table: &'a PartitionTable,
        state: &'a TransactionState,
        metrics: &'a MetricsRegistry,
    ) -> Self {
        Self {
            metadata,
            primary,
            table,
            state,
            metrics,
        }
    }

    /// Stores in acquisition order.
    fn stores(&self) -> Vec<Store<'a>> {
        let mut stores = Vec::with_capacity(self.table.len() + 2);
        stores.push(Store::Metadata(self.metadata));
        stores.push(Store::Backend(self.primary));
        let table: &'a PartitionTable = self.table;
        for p in table {
            stores.push(Store::Backend(p.backend.as_ref()));
        }
        stores
    }

    /// Run `step` in order; on failure undo the acquired prefix.
    fn acquire(&self, step: Step, undo: Step) -> DirResult<()> {
        let stores = self.stores();
        for (i, store) in stores.iter().enumerate() {
            if let Err(err) = store.call(step) {
                if i > 0 {
                    self.unwind(&stores[..i], undo, store.label(), &err);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn unwind(&self, acquired: &[Store<'_>], undo: Step, failed_at: &str, cause: &DirectoryError) {
        self.metrics.increment_unwinds();
        log_event(
            Event::TxnUnwind,
            &[
                ("cause", cause.code()),
                ("failed_at", failed_at),
                ("released", &acquired.len().to_string()),
                ("step", undo.as_str()),
            ],
        );
        for store in acquired.iter().rev() {
            if let Err(err) = store.call(undo) {
                log_event(
                    Event::TxnUnwind,
                    &[
                        ("code", err.code()),
                        ("store", store.label()),
                        ("unwind_error", &err.message),
                    ],
                );
            }
        }
    }

    /// Run `step` in reverse order on every store; first error wins.
    fn release_all(&self, step: Step) -> Option<DirectoryError> {
        let mut first = None;
        for store in self.stores().iter().rev() {
            if let Err(err) = store.call(step) {
                first.get_or_insert(err);
            }
        }
        first
    }

    fn mismatch(&self, step: Step) -> DirectoryError {
        self.metrics.increment_mismatches();
        log_event(Event::TxnMismatch, &[("step", step.as_str())]);
        DirectoryError::transaction_mismatch(format!("{} without an active transaction", step.as_str()))
    }

    fn scope(&self, event: Event) -> ObservationScope {
        ObservationScope::with_severity(
            event.as_str(),
            Severity::Trace,
            &[("depth", &self.state.depth().to_string())],
        )
    }

    fn finish(scope: ObservationScope, result: DirResult<()>) -> DirResult<()> {
        match &result {
            Ok(()) => scope.complete(&[]),
            Err(err) => scope.fail(&err.to_string()),
        }
        result
    }

    /// Start a transaction everywhere.
    pub fn start(&self) -> DirResult<()> {
        let scope = self.scope(Event::TxnStart);
        let result = self.acquire(Step::Start, Step::Delete);
        if result.is_ok() {
            self.state.increment();
            self.metrics.increment_transactions_started();
        }
        Self::finish(scope, result)
    }

    /// Prepare to commit everywhere; stops at the first failure.
    pub fn prepare_commit(&self) -> DirResult<()> {
        let scope = self.scope(Event::TxnPrepare);
        let result = self.stores().iter().try_for_each(|s| s.call(Step::Prepare));
        Self::finish(scope, result)
    }

    /// Commit everywhere, in reverse order.
    pub fn end(&self) -> DirResult<()> {
        let scope = self.scope(Event::TxnCommit);
        let mismatch = if self.state.decrement() {
            None
        } else {
            Some(self.mismatch(Step::End))
        };
        let failure = self.release_all(Step::End);
        let result = match mismatch.or(failure) {
            Some(err) => Err(err),
            None => Ok(()),
        };
        if result.is_ok() {
            self.metrics.increment_transactions_committed();
        }
        Self::finish(scope, result)
    }

    /// Abort everywhere, in reverse order.
    pub fn delete(&self) -> DirResult<()> {
        let scope = self.scope(Event::TxnAbort);
        let failure = self.release_all(Step::Delete);
        let mismatch = if self.state.decrement() {
            None
        } else {
            Some(self.mismatch(Step::Delete))
        };
        self.metrics.increment_transactions_aborted();
        let result = match mismatch.or(failure) {
            Some(err) => Err(err),
            None => Ok(()),
        };
        Self::finish(scope, result)
    }

    /// Take a read lock everywhere; unwinds on failure.
    pub fn read_lock(&self) -> DirResult<()> {
        let scope = self.scope(Event::ReadLock);
        let result = self.acquire(Step::ReadLock, Step::ReadUnlock);
        Self::finish(scope, result)
    }

    /// Release read locks everywhere, in reverse order.
    pub fn read_unlock(&self) -> DirResult<()> {
        let scope = self.scope(Event::ReadUnlock);
        let result = match self.release_all(Step::ReadUnlock) {
            Some(err) => Err(err),
            None => Ok(()),
        };
        Self::finish(scope, result)
    }
}
