//! Shared fixtures for the partition integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use dirpart::backend::{CallJournal, MemoryBackend, MemoryMetadataStore, TransactionalStore};
use dirpart::dn::Dn;
use dirpart::message::Message;
use dirpart::partition::{Partition, PartitionModule, PartitionTable};

pub fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// A partition module over journaled in-memory stores.
///
/// Every partition backend is named after its root DN, so journal entries
/// read `"<root>:<call>"`. Each partition starts out holding its root entry.
pub struct Cluster {
    pub journal: CallJournal,
    pub primary: Arc<MemoryBackend>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub partitions: Vec<Arc<MemoryBackend>>,
    pub module: PartitionModule,
}

impl Cluster {
    pub fn new(roots: &[&str]) -> Self {
        Self::build(roots, &[])
    }

    /// Like `new`, with the partitions at `partial` marked partial replicas.
    pub fn build(roots: &[&str], partial: &[usize]) -> Self {
        let journal = CallJournal::new();
        let primary = Arc::new(MemoryBackend::new("primary").with_journal(journal.clone()));
        let metadata = Arc::new(MemoryMetadataStore::new().with_journal(journal.clone()));

        let mut partitions = Vec::new();
        let mut entries = Vec::new();
        for (i, root) in roots.iter().enumerate() {
            let backend = Arc::new(MemoryBackend::with_root(*root, dn(root)).with_journal(journal.clone()));
            backend.insert(Message::new(dn(root)).with_attr("objectClass", &["top"]));
            let mut partition = Partition::new(dn(root), backend.clone());
            if partial.contains(&i) {
                partition = partition.partial();
            }
            partitions.push(backend);
            entries.push(partition);
        }

        let table = PartitionTable::new(entries).unwrap();
        let module = PartitionModule::new(primary.clone(), metadata.clone(), table);
        Self {
            journal,
            primary,
            metadata,
            partitions,
            module,
        }
    }

    /// The backend of the partition rooted at `root`.
    pub fn backend(&self, root: &str) -> &Arc<MemoryBackend> {
        let target = dn(root);
        self.partitions
            .iter()
            .find(|b| b.name() == target.linearized())
            .unwrap()
    }
}
