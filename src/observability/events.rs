//! Observable partition-layer events
//!
//! Events are explicit and typed; their string form is the `event` field
//! of a log line.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Partition table written to disk
    TablePersisted,
    /// Partition table read from disk
    TableLoaded,
    /// New partition published
    PartitionCreated,

    // Routing
    /// Router picked a destination
    RouteDecision,
    /// Rename spans two partitions
    RenameRejected,

    // Fan-out
    /// Fan-out context created
    FanoutBegin,
    /// One sub-request handed to a partition
    SubrequestDispatch,
    /// Terminal reply delivered after all sub-requests completed
    FanoutComplete,
    /// A sub-request failed; fan-out short-circuited
    FanoutAborted,
    /// Reply arrived after the fan-out finished
    LateReplyDiscarded,

    // Special-DN propagation
    SpecialDnPropagateBegin,
    SpecialDnPropagateComplete,
    SpecialDnPropagateFailed,

    // Transactions and locks
    /// One store's step in a lifecycle call
    TxnStep,
    TxnStart,
    TxnPrepare,
    TxnCommit,
    TxnAbort,
    /// Partial acquisition released in reverse order
    TxnUnwind,
    /// end/delete without a matching start
    TxnMismatch,
    ReadLock,
    ReadUnlock,

    // Sequence numbers
    /// Store reported a timestamp where a counter was required
    SequenceRejected,
    SchemaUpdated,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TablePersisted => "TABLE_PERSISTED",
            Event::TableLoaded => "TABLE_LOADED",
            Event::PartitionCreated => "PARTITION_CREATED",

            Event::RouteDecision => "ROUTE_DECISION",
            Event::RenameRejected => "RENAME_REJECTED",

            Event::FanoutBegin => "FANOUT_BEGIN",
            Event::SubrequestDispatch => "SUBREQUEST_DISPATCH",
            Event::FanoutComplete => "FANOUT_COMPLETE",
            Event::FanoutAborted => "FANOUT_ABORTED",
            Event::LateReplyDiscarded => "LATE_REPLY_DISCARDED",

            Event::SpecialDnPropagateBegin => "SPECIAL_DN_PROPAGATE_BEGIN",
            Event::SpecialDnPropagateComplete => "SPECIAL_DN_PROPAGATE_COMPLETE",
            Event::SpecialDnPropagateFailed => "SPECIAL_DN_PROPAGATE_FAILED",

            Event::TxnStep => "TXN_STEP",
            Event::TxnStart => "TXN_START",
            Event::TxnPrepare => "TXN_PREPARE",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnAbort => "TXN_ABORT",
            Event::TxnUnwind => "TXN_UNWIND",
            Event::TxnMismatch => "TXN_MISMATCH",
            Event::ReadLock => "READ_LOCK",
            Event::ReadUnlock => "READ_UNLOCK",

            Event::SequenceRejected => "SEQUENCE_REJECTED",
            Event::SchemaUpdated => "SCHEMA_UPDATED",
        }
    }

    /// Default severity for this event.
    pub fn severity(&self) -> Severity {
        match self {
            Event::RouteDecision
            | Event::SubrequestDispatch
            | Event::TxnStep
            | Event::ReadLock
            | Event::ReadUnlock
            | Event::FanoutBegin
            | Event::FanoutComplete => Severity::Trace,
            Event::FanoutAborted
            | Event::SpecialDnPropagateFailed
            | Event::TxnUnwind
            | Event::TxnMismatch
            | Event::SequenceRejected
            | Event::RenameRejected
            | Event::LateReplyDiscarded => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
