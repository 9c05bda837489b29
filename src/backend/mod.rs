//! Backend Capability Interfaces
//!
//! Every store below the partition layer exposes the same operation set:
//! request handling with a reply stream, the transaction lifecycle,
//! advisory read locks and sequence numbers. The partition layer itself
//! implements `Backend`, so it can be stacked like any other store.
//!
//! # Reply contract
//!
//! `Backend::request` delivers zero or more `Reply::Entry` /
//! `Reply::Referral` replies followed by exactly one `Reply::Done`.
//! An `Err` return means the request was refused before any reply was
//! produced; no `Done` follows in that case.

mod collect;
mod journal;
mod memory;

use std::sync::Arc;

pub use collect::{execute, Collected};
pub use journal::{CallJournal, Failpoints, StoreCall};
pub use memory::{MemoryBackend, MemoryBackendFactory, MemoryMetadataStore};

use crate::dn::Dn;
use crate::error::DirResult;
use crate::message::{Reply, Request, SeqNumKind, SeqNumResult};

/// Receives the replies of one request.
pub trait ReplySink {
    fn send(&mut self, reply: Reply);
}

impl ReplySink for Vec<Reply> {
    fn send(&mut self, reply: Reply) {
        self.push(reply);
    }
}

/// Transaction lifecycle and advisory read locks.
///
/// Nesting is the store's business: a second `start_transaction` must be
/// matched by a second `end_transaction` or `delete_transaction`.
pub trait TransactionalStore: Send + Sync {
    /// Name used in logs and journals
    fn name(&self) -> &str;

    fn start_transaction(&self) -> DirResult<()>;
    fn prepare_commit(&self) -> DirResult<()>;
    fn end_transaction(&self) -> DirResult<()>;
    fn delete_transaction(&self) -> DirResult<()>;

    fn read_lock(&self) -> DirResult<()>;
    fn read_unlock(&self) -> DirResult<()>;
}

/// A store that handles directory requests.
pub trait Backend: TransactionalStore {
    /// Handle search, add, modify, delete, rename and extended requests.
    fn request(&self, req: &Request, sink: &mut dyn ReplySink) -> DirResult<()>;

    /// Report a sequence number.
    fn sequence_number(&self, kind: SeqNumKind) -> DirResult<SeqNumResult>;
}

/// The store that anchors global sequencing and cross-partition
/// transaction ordering.
pub trait MetadataStore: TransactionalStore {
    /// Highest global sequence number.
    fn sequence_number(&self) -> DirResult<SeqNumResult>;

    /// Allocate the next global sequence number.
    fn increment_sequence_number(&self) -> DirResult<u64>;

    /// Bump the schema sequence after a schema reload request.
    fn increment_schema_sequence(&self) -> DirResult<u64>;
}

/// Opens backends for newly configured partitions.
pub trait BackendFactory: Send + Sync {
    fn open(&self, kind: &str, root: &Dn) -> DirResult<Arc<dyn Backend>>;
}
