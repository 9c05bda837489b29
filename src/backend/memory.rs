//! In-memory stores
//!
//! Reference implementations of the backend and metadata interfaces.
//! They keep entries in a map keyed by the case-folded DN, count nested
//! transactions and read locks, and hand out counter-based sequence
//! numbers. Every call is written to an optional `CallJournal` and may be
//! failed through `Failpoints`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError};
use crate::message::{
    Completion, ExtendedOp, ExtendedResponse, Message, ModFlag, Operation, Reply, Request,
    SearchOp, SeqNumKind, SeqNumResult,
};

use super::journal::{CallJournal, Failpoints, StoreCall};
use super::{Backend, BackendFactory, MetadataStore, ReplySink, TransactionalStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn key(dn: &Dn) -> String {
    dn.linearized().to_lowercase()
}

/// Transaction depth and read-lock count shared by both store kinds.
#[derive(Debug, Default)]
struct LockState {
    transaction_depth: u32,
    read_locks: u32,
}

impl LockState {
    fn start(&mut self) {
        self.transaction_depth += 1;
    }

    fn prepare(&self, store: &str) -> DirResult<()> {
        if self.transaction_depth == 0 {
            return Err(DirectoryError::operations(format!(
                "{}: prepare_commit without a transaction",
                store
            )));
        }
        Ok(())
    }

    fn finish(&mut self, store: &str, call: StoreCall) -> DirResult<()> {
        if self.transaction_depth == 0 {
            return Err(DirectoryError::operations(format!(
                "{}: {} without a transaction",
                store, call
            )));
        }
        self.transaction_depth -= 1;
        Ok(())
    }

    fn unlock(&mut self, store: &str) -> DirResult<()> {
        if self.read_locks == 0 {
            return Err(DirectoryError::operations(format!(
                "{}: read_unlock without a read lock",
                store
            )));
        }
        self.read_locks -= 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Message>,
    sequence: u64,
    locks: LockState,
}

/// In-memory directory store.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    /// Subtree root this store serves; always searchable even if absent.
    root: Option<Dn>,
    state: Mutex<MemoryState>,
    journal: Option<CallJournal>,
    failpoints: Failpoints,
    timestamp_sequence: bool,
}

impl MemoryBackend {
    /// A store with no subtree root (e.g. the primary store).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            state: Mutex::new(MemoryState::default()),
            journal: None,
            failpoints: Failpoints::new(),
            timestamp_sequence: false,
        }
    }

    /// A store serving the subtree under `root`.
    pub fn with_root(name: impl Into<String>, root: Dn) -> Self {
        Self {
            root: Some(root),
            ..Self::new(name)
        }
    }

    /// Builder: record calls into `journal`.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Builder: report sequence numbers as timestamp-based.
    pub fn with_timestamp_sequence(mut self) -> Self {
        self.timestamp_sequence = true;
        self
    }

    /// Failpoints for this store.
    pub fn failpoints(&self) -> &Failpoints {
        &self.failpoints
    }

    /// Insert an entry directly, bypassing request handling.
    pub fn insert(&self, message: Message) {
        lock(&self.state).entries.insert(key(&message.dn), message);
    }

    /// Look up an entry directly.
    pub fn entry(&self, dn: &Dn) -> Option<Message> {
        lock(&self.state).entries.get(&key(dn)).cloned()
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        lock(&self.state).entries.contains_key(&key(dn))
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transaction_depth(&self) -> u32 {
        lock(&self.state).locks.transaction_depth
    }

    pub fn read_lock_count(&self) -> u32 {
        lock(&self.state).locks.read_locks
    }

    /// Current local sequence number.
    pub fn current_sequence(&self) -> u64 {
        lock(&self.state).sequence
    }

    fn enter(&self, call: StoreCall) -> DirResult<()> {
        if let Some(journal) = &self.journal {
            journal.record(&self.name, call);
        }
        self.failpoints.check(call)
    }

    fn search(&self, op: &SearchOp, sink: &mut dyn ReplySink) -> DirResult<()> {
        let state = lock(&self.state);
        let base_is_root = self.root.as_ref() == Some(&op.base);
        if !base_is_root && !op.base.is_null() && !state.entries.contains_key(&key(&op.base)) {
            return Err(DirectoryError::no_such_object(format!(
                "{}: search base {} does not exist",
                self.name, op.base
            )));
        }

        let matches: Vec<Message> = state
            .entries
            .values()
            .filter(|msg| op.scope.includes(&op.base, &msg.dn) && op.filter.matches(msg))
            .map(|msg| project(msg, &op.attrs))
            .collect();
        drop(state);

        for msg in matches {
            sink.send(Reply::entry(msg));
        }
        Ok(())
    }

    fn add(&self, message: &Message) -> DirResult<()> {
        let mut state = lock(&self.state);
        let k = key(&message.dn);
        if state.entries.contains_key(&k) {
            return Err(DirectoryError::entry_already_exists(format!(
                "{}: {} already exists",
                self.name, message.dn
            )));
        }
        let mut stored = message.clone();
        stored.mark_all(ModFlag::None);
        state.entries.insert(k, stored);
        state.sequence += 1;
        Ok(())
    }

    fn modify(&self, changes: &Message) -> DirResult<()> {
        let mut state = lock(&self.state);
        let entry = state.entries.get_mut(&key(&changes.dn)).ok_or_else(|| {
            DirectoryError::no_such_object(format!("{}: {} does not exist", self.name, changes.dn))
        })?;
        for change in &changes.elements {
            apply_change(entry, change.flag, &change.name, &change.values);
        }
        state.sequence += 1;
        Ok(())
    }

    fn delete(&self, dn: &Dn) -> DirResult<()> {
        let mut state = lock(&self.state);
        if state.entries.remove(&key(dn)).is_none() {
            return Err(DirectoryError::no_such_object(format!(
                "{}: {} does not exist",
                self.name, dn
            )));
        }
        state.sequence += 1;
        Ok(())
    }

    fn rename(&self, old: &Dn, new: &Dn) -> DirResult<()> {
        let mut state = lock(&self.state);
        if state.entries.contains_key(&key(new)) {
            return Err(DirectoryError::entry_already_exists(format!(
                "{}: {} already exists",
                self.name, new
            )));
        }
        let mut entry = state.entries.remove(&key(old)).ok_or_else(|| {
            DirectoryError::no_such_object(format!("{}: {} does not exist", self.name, old))
        })?;
        entry.dn = new.clone();
        state.entries.insert(key(new), entry);
        state.sequence += 1;
        Ok(())
    }

    fn extended(&self, op: &ExtendedOp) -> DirResult<Completion> {
        let completion = match op {
            ExtendedOp::SequenceNumber(kind) => Completion::success()
                .with_response(ExtendedResponse::SequenceNumber(self.local_sequence(*kind)?)),
            ExtendedOp::StartTls => Completion::success().with_response(ExtendedResponse::StartTls),
            _ => Completion::success(),
        };
        Ok(completion)
    }

    fn local_sequence(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        let mut state = lock(&self.state);
        match kind {
            SeqNumKind::Next => {
                state.sequence += 1;
                Ok(SeqNumResult::counter(state.sequence))
            }
            SeqNumKind::HighestSeq if self.timestamp_sequence => {
                Ok(SeqNumResult::timestamp(Utc::now().timestamp().max(0) as u64))
            }
            SeqNumKind::HighestSeq => Ok(SeqNumResult::counter(state.sequence)),
            SeqNumKind::HighestTimestamp => {
                Ok(SeqNumResult::timestamp(Utc::now().timestamp().max(0) as u64))
            }
        }
    }
}

fn project(msg: &Message, attrs: &[String]) -> Message {
    if attrs.is_empty() || attrs.iter().any(|a| a == "*") {
        return msg.clone();
    }
    let mut projected = Message::new(msg.dn.clone());
    projected.elements = msg
        .elements
        .iter()
        .filter(|el| attrs.iter().any(|a| el.is_named(a)))
        .cloned()
        .collect();
    projected
}

fn apply_change(entry: &mut Message, flag: ModFlag, name: &str, values: &[String]) {
    match flag {
        ModFlag::Replace => {
            entry.remove_element(name);
            if !values.is_empty() {
                entry.elements.push(crate::message::Element::new(name, values.to_vec()));
            }
        }
        ModFlag::Delete => {
            if values.is_empty() {
                entry.remove_element(name);
                return;
            }
            if let Some(el) = entry.find_element_mut(name) {
                el.values.retain(|v| !values.contains(v));
            }
            if entry.values(name).is_empty() {
                entry.remove_element(name);
            }
        }
        ModFlag::Add | ModFlag::None => match entry.find_element_mut(name) {
            Some(el) => el.values.extend(values.iter().cloned()),
            None => entry
                .elements
                .push(crate::message::Element::new(name, values.to_vec())),
        },
    }
}

impl TransactionalStore for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::StartTransaction)?;
        lock(&self.state).locks.start();
        Ok(())
    }

    fn prepare_commit(&self) -> DirResult<()> {
        self.enter(StoreCall::PrepareCommit)?;
        lock(&self.state).locks.prepare(&self.name)
    }

    fn end_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::EndTransaction)?;
        lock(&self.state)
            .locks
            .finish(&self.name, StoreCall::EndTransaction)
    }

    fn delete_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::DeleteTransaction)?;
        lock(&self.state)
            .locks
            .finish(&self.name, StoreCall::DeleteTransaction)
    }

    fn read_lock(&self) -> DirResult<()> {
        self.enter(StoreCall::ReadLock)?;
        lock(&self.state).locks.read_locks += 1;
        Ok(())
    }

    fn read_unlock(&self) -> DirResult<()> {
        self.enter(StoreCall::ReadUnlock)?;
        lock(&self.state).locks.unlock(&self.name)
    }
}

impl Backend for MemoryBackend {
    fn request(&self, req: &Request, sink: &mut dyn ReplySink) -> DirResult<()> {
        let call = match &req.operation {
            Operation::Search(_) => StoreCall::Search,
            Operation::Add(_) => StoreCall::Add,
            Operation::Modify(_) => StoreCall::Modify,
            Operation::Delete(_) => StoreCall::Delete,
            Operation::Rename { .. } => StoreCall::Rename,
            Operation::Extended(_) => StoreCall::Extended,
        };

        let outcome = self.enter(call).and_then(|()| match &req.operation {
            Operation::Search(op) => self.search(op, sink).map(|()| Completion::success()),
            Operation::Add(msg) => self.add(msg).map(|()| Completion::success()),
            Operation::Modify(msg) => self.modify(msg).map(|()| Completion::success()),
            Operation::Delete(dn) => self.delete(dn).map(|()| Completion::success()),
            Operation::Rename { old, new } => self.rename(old, new).map(|()| Completion::success()),
            Operation::Extended(op) => self.extended(op),
        });

        match outcome {
            Ok(completion) => sink.send(Reply::Done(completion)),
            Err(err) => sink.send(Reply::failed(err)),
        }
        Ok(())
    }

    fn sequence_number(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        self.enter(StoreCall::SequenceNumber)?;
        self.local_sequence(kind)
    }
}

#[derive(Debug, Default)]
struct MetadataState {
    sequence: u64,
    schema_sequence: u64,
    locks: LockState,
}

/// In-memory metadata store.
#[derive(Debug)]
pub struct MemoryMetadataStore {
    name: String,
    state: Mutex<MetadataState>,
    journal: Option<CallJournal>,
    failpoints: Failpoints,
    timestamp_sequence: bool,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            name: "metadata".to_string(),
            state: Mutex::new(MetadataState::default()),
            journal: None,
            failpoints: Failpoints::new(),
            timestamp_sequence: false,
        }
    }

    /// Builder: record calls into `journal`.
    pub fn with_journal(mut self, journal: CallJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Builder: report the sequence number as timestamp-based.
    pub fn with_timestamp_sequence(mut self) -> Self {
        self.timestamp_sequence = true;
        self
    }

    pub fn failpoints(&self) -> &Failpoints {
        &self.failpoints
    }

    pub fn transaction_depth(&self) -> u32 {
        lock(&self.state).locks.transaction_depth
    }

    pub fn read_lock_count(&self) -> u32 {
        lock(&self.state).locks.read_locks
    }

    pub fn schema_sequence(&self) -> u64 {
        lock(&self.state).schema_sequence
    }

    fn enter(&self, call: StoreCall) -> DirResult<()> {
        if let Some(journal) = &self.journal {
            journal.record(&self.name, call);
        }
        self.failpoints.check(call)
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalStore for MemoryMetadataStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::StartTransaction)?;
        lock(&self.state).locks.start();
        Ok(())
    }

    fn prepare_commit(&self) -> DirResult<()> {
        self.enter(StoreCall::PrepareCommit)?;
        lock(&self.state).locks.prepare(&self.name)
    }

    fn end_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::EndTransaction)?;
        lock(&self.state)
            .locks
            .finish(&self.name, StoreCall::EndTransaction)
    }

    fn delete_transaction(&self) -> DirResult<()> {
        self.enter(StoreCall::DeleteTransaction)?;
        lock(&self.state)
            .locks
            .finish(&self.name, StoreCall::DeleteTransaction)
    }

    fn read_lock(&self) -> DirResult<()> {
        self.enter(StoreCall::ReadLock)?;
        lock(&self.state).locks.read_locks += 1;
        Ok(())
    }

    fn read_unlock(&self) -> DirResult<()> {
        self.enter(StoreCall::ReadUnlock)?;
        lock(&self.state).locks.unlock(&self.name)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn sequence_number(&self) -> DirResult<SeqNumResult> {
        self.enter(StoreCall::SequenceNumber)?;
        let state = lock(&self.state);
        if self.timestamp_sequence {
            return Ok(SeqNumResult::timestamp(state.sequence));
        }
        Ok(SeqNumResult::counter(state.sequence))
    }

    fn increment_sequence_number(&self) -> DirResult<u64> {
        self.enter(StoreCall::SequenceNumber)?;
        let mut state = lock(&self.state);
        state.sequence += 1;
        Ok(state.sequence)
    }

    fn increment_schema_sequence(&self) -> DirResult<u64> {
        self.enter(StoreCall::Extended)?;
        let mut state = lock(&self.state);
        state.schema_sequence += 1;
        Ok(state.schema_sequence)
    }
}

/// Opens `MemoryBackend`s for the `"memory"` backend kind.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackendFactory {
    journal: Option<CallJournal>,
}

impl MemoryBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: every opened store records into `journal`.
    pub fn with_journal(journal: CallJournal) -> Self {
        Self {
            journal: Some(journal),
        }
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn open(&self, kind: &str, root: &Dn) -> DirResult<Arc<dyn Backend>> {
        if kind != "memory" {
            return Err(DirectoryError::unwilling_to_perform(format!(
                "unknown backend kind '{}'",
                kind
            )));
        }
        let mut backend = MemoryBackend::with_root(root.linearized(), root.clone());
        if let Some(journal) = &self.journal {
            backend = backend.with_journal(journal.clone());
        }
        Ok(Arc::new(backend))
    }
}
