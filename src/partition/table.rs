//! The Partition Table
//!
//! An ordered list of partitions. Order is load-bearing: routing takes
//! the first partition whose root is ancestor-or-equal of a DN, so a
//! partition must appear before every partition whose root is an
//! ancestor of its own. `PartitionTable::new` rejects lists that break
//! this, and `insert` places new partitions where it keeps holding.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError};

/// Backend kind used when none is configured.
pub const DEFAULT_BACKEND_KIND: &str = "memory";

fn default_backend_kind() -> String {
    DEFAULT_BACKEND_KIND.to_string()
}

/// The persisted description of a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub dn: Dn,
    #[serde(default)]
    pub partial_replica: bool,
    #[serde(default = "default_backend_kind")]
    pub backend: String,
}

impl PartitionDescriptor {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            partial_replica: false,
            backend: default_backend_kind(),
        }
    }

    /// Builder: mark as a partial replica.
    pub fn partial(mut self) -> Self {
        self.partial_replica = true;
        self
    }
}

/// A partition: a subtree root and the backend that stores it.
#[derive(Clone)]
pub struct Partition {
    pub dn: Dn,
    pub backend: Arc<dyn Backend>,
    pub partial_replica: bool,
    /// Backend kind, kept for persistence
    pub kind: String,
}

impl Partition {
    pub fn new(dn: Dn, backend: Arc<dyn Backend>) -> Self {
        Self {
            dn,
            backend,
            partial_replica: false,
            kind: default_backend_kind(),
        }
    }

    /// Build from a descriptor and an opened backend.
    pub fn from_descriptor(descriptor: &PartitionDescriptor, backend: Arc<dyn Backend>) -> Self {
        Self {
            dn: descriptor.dn.clone(),
            backend,
            partial_replica: descriptor.partial_replica,
            kind: descriptor.backend.clone(),
        }
    }

    /// Builder: mark as a partial replica.
    pub fn partial(mut self) -> Self {
        self.partial_replica = true;
        self
    }

    pub fn descriptor(&self) -> PartitionDescriptor {
        PartitionDescriptor {
            dn: self.dn.clone(),
            partial_replica: self.partial_replica,
            backend: self.kind.clone(),
        }
    }

    /// Partition root as a string, for logs.
    pub fn label(&self) -> String {
        self.dn.linearized()
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("dn", &self.dn)
            .field("backend", &self.backend.name())
            .field("partial_replica", &self.partial_replica)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered partition list, most nested subtrees first.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    partitions: Vec<Partition>,
}

impl PartitionTable {
    /// An empty table. Every request passes to the primary store.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, checking the ordering precondition.
    pub fn new(partitions: Vec<Partition>) -> DirResult<Self> {
        let table = Self { partitions };
        table.validate()?;
        Ok(table)
    }

    /// Check roots are ordinary DNs, unique, and nested roots come first.
    pub fn validate(&self) -> DirResult<()> {
        for (i, p) in self.partitions.iter().enumerate() {
            if p.dn.is_null() || p.dn.is_special() {
                return Err(DirectoryError::invalid_dn(format!(
                    "partition root '{}' must be an ordinary DN",
                    p.dn
                )));
            }
            for later in &self.partitions[i + 1..] {
                if later.dn == p.dn {
                    return Err(DirectoryError::entry_already_exists(format!(
                        "partition {} listed twice",
                        p.dn
                    )));
                }
                if p.dn.is_ancestor_of(&later.dn) {
                    return Err(DirectoryError::unwilling_to_perform(format!(
                        "partition {} must be listed before its ancestor {}",
                        later.dn, p.dn
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Partition> {
        self.partitions.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    /// The partition rooted exactly at `dn`.
    pub fn get_by_dn(&self, dn: &Dn) -> Option<&Partition> {
        self.partitions.iter().find(|p| &p.dn == dn)
    }

    /// First partition whose root is ancestor-or-equal of `dn`.
    pub fn owner_of(&self, dn: &Dn) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.dn.is_base_of(dn))
    }

    /// Insert a partition before its first ancestor, or at the end.
    ///
    /// Returns the index it landed at.
    pub fn insert(&mut self, partition: Partition) -> DirResult<usize> {
        if partition.dn.is_null() || partition.dn.is_special() {
            return Err(DirectoryError::invalid_dn(format!(
                "partition root '{}' must be an ordinary DN",
                partition.dn
            )));
        }
        if self.get_by_dn(&partition.dn).is_some() {
            return Err(DirectoryError::entry_already_exists(format!(
                "partition {} already exists",
                partition.dn
            )));
        }
        let index = self
            .partitions
            .iter()
            .position(|p| p.dn.is_ancestor_of(&partition.dn))
            .unwrap_or(self.partitions.len());
        self.partitions.insert(index, partition);
        Ok(index)
    }

    pub fn descriptors(&self) -> Vec<PartitionDescriptor> {
        self.partitions.iter().map(Partition::descriptor).collect()
    }
}

impl<'a> IntoIterator for &'a PartitionTable {
    type Item = &'a Partition;
    type IntoIter = std::slice::Iter<'a, Partition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.iter()
    }
}
