//! Call journal and failpoints for in-memory stores
//!
//! The journal records every call a store receives as `"<store>:<call>"`
//! in one shared, ordered list, so lock and commit ordering across
//! several stores can be asserted. Failpoints make a named call fail
//! with a chosen error until cleared.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{DirResult, DirectoryError};

/// Calls a store can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Search,
    Add,
    Modify,
    Delete,
    Rename,
    Extended,
    SequenceNumber,
    StartTransaction,
    PrepareCommit,
    EndTransaction,
    DeleteTransaction,
    ReadLock,
    ReadUnlock,
}

impl StoreCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreCall::Search => "search",
            StoreCall::Add => "add",
            StoreCall::Modify => "modify",
            StoreCall::Delete => "delete",
            StoreCall::Rename => "rename",
            StoreCall::Extended => "extended",
            StoreCall::SequenceNumber => "sequence_number",
            StoreCall::StartTransaction => "start_transaction",
            StoreCall::PrepareCommit => "prepare_commit",
            StoreCall::EndTransaction => "end_transaction",
            StoreCall::DeleteTransaction => "delete_transaction",
            StoreCall::ReadLock => "read_lock",
            StoreCall::ReadUnlock => "read_unlock",
        }
    }
}

impl fmt::Display for StoreCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared, ordered record of store calls.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `"<store>:<call>"`.
    pub fn record(&self, store: &str, call: StoreCall) {
        lock(&self.entries).push(format!("{}:{}", store, call));
    }

    /// All entries in call order.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Entries for one kind of call, in order.
    pub fn calls(&self, call: StoreCall) -> Vec<String> {
        let suffix = format!(":{}", call);
        lock(&self.entries)
            .iter()
            .filter(|e| e.ends_with(&suffix))
            .cloned()
            .collect()
    }

    /// Store names that received `call`, in order.
    pub fn stores_for(&self, call: StoreCall) -> Vec<String> {
        self.calls(call)
            .into_iter()
            .filter_map(|e| e.rsplit_once(':').map(|(store, _)| store.to_string()))
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Injected failures keyed by call.
#[derive(Debug, Default)]
pub struct Failpoints {
    armed: Mutex<HashMap<StoreCall, DirectoryError>>,
}

impl Failpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `call` fail with `error` until cleared.
    pub fn arm(&self, call: StoreCall, error: DirectoryError) {
        lock(&self.armed).insert(call, error);
    }

    pub fn clear(&self, call: StoreCall) {
        lock(&self.armed).remove(&call);
    }

    /// Fail if `call` is armed.
    pub fn check(&self, call: StoreCall) -> DirResult<()> {
        match lock(&self.armed).get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
