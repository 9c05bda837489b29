//! Sequence Tracker
//!
//! The global sequence number comes from the metadata store's counter.
//! The legacy flavour sums the primary store's counter with every
//! partition's and is reported as global but not monotonic.

use crate::backend::{Backend, MetadataStore};
use crate::error::{DirResult, DirectoryError};
use crate::message::{SeqNumKind, SeqNumResult};
use crate::observability::{log_event, Event};

use super::table::PartitionTable;

pub struct SequenceTracker<'a> {
    metadata: &'a dyn MetadataStore,
    primary: &'a dyn Backend,
    table: &'a PartitionTable,
}

fn kind_str(kind: SeqNumKind) -> &'static str {
    match kind {
        SeqNumKind::Next => "next",
        SeqNumKind::HighestSeq => "highest_seq",
        SeqNumKind::HighestTimestamp => "highest_timestamp",
    }
}

fn reject(source: &str, reason: &str) -> DirectoryError {
    log_event(Event::SequenceRejected, &[("reason", reason), ("source", source)]);
    DirectoryError::operations(format!("{source} sequence number {reason}"))
}

impl<'a> SequenceTracker<'a> {
    pub fn new(
        metadata: &'a dyn MetadataStore,
        primary: &'a dyn Backend,
        table: &'a PartitionTable,
    ) -> Self {
        Self {
            metadata,
            primary,
            table,
        }
    }

    /// The global sequence number, from the metadata store.
    ///
    /// `Next` allocates a new number, `HighestSeq` reads the current one.
    /// Timestamp-based sequences are not supported.
    pub fn global(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        let value = match kind {
            SeqNumKind::Next => self.metadata.increment_sequence_number()?,
            SeqNumKind::HighestSeq => {
                let current = self.metadata.sequence_number()?;
                if current.timestamp_based {
                    return Err(reject("metadata", "is timestamp based"));
                }
                current.value
            }
            SeqNumKind::HighestTimestamp => {
                return Err(reject("metadata", "of kind highest_timestamp is not supported"));
            }
        };
        Ok(SeqNumResult::global(value))
    }

    /// The primary store's own counter.
    pub fn primary(&self) -> DirResult<SeqNumResult> {
        let result = self.primary.sequence_number(SeqNumKind::HighestSeq)?;
        if result.timestamp_based {
            return Err(reject(self.primary.name(), "is timestamp based"));
        }
        Ok(SeqNumResult::counter(result.value))
    }

    /// Legacy sum of the primary counter and every partition's `kind` value.
    pub fn summed(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        let mut total = self.primary()?.value;
        for p in self.table {
            let local = p.backend.sequence_number(kind)?;
            total = total.checked_add(local.value).ok_or_else(|| {
                DirectoryError::operations(format!(
                    "sequence sum overflowed at partition {} ({})",
                    p.dn,
                    kind_str(kind)
                ))
            })?;
        }
        Ok(SeqNumResult::summed(total))
    }
}
