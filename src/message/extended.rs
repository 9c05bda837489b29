//! Extended operations and sequence numbers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dn::Dn;

pub const OID_SEQUENCE_NUMBER: &str = "1.3.6.1.4.1.7165.4.4.3";
pub const OID_SCHEMA_UPDATE_NOW: &str = "1.3.6.1.4.1.7165.4.4.2";
pub const OID_CREATE_PARTITION: &str = "1.3.6.1.4.1.7165.4.4.4";
pub const OID_START_TLS: &str = "1.3.6.1.4.1.1466.20037";

/// Which sequence number is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeqNumKind {
    /// Allocate and return the next number
    Next,
    /// Highest number handed out so far
    HighestSeq,
    /// Highest modification timestamp
    HighestTimestamp,
}

/// A sequence number together with how it was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqNumResult {
    pub value: u64,
    /// Derived from a clock rather than a counter
    pub timestamp_based: bool,
    /// Covers the whole partitioned namespace
    pub global: bool,
    /// Guaranteed never to decrease
    pub monotonic: bool,
}

impl SeqNumResult {
    /// A store-local counter value.
    pub fn counter(value: u64) -> Self {
        Self {
            value,
            timestamp_based: false,
            global: false,
            monotonic: true,
        }
    }

    /// A clock-derived value.
    pub fn timestamp(value: u64) -> Self {
        Self {
            value,
            timestamp_based: true,
            global: false,
            monotonic: false,
        }
    }

    /// The metadata store's global counter.
    pub fn global(value: u64) -> Self {
        Self {
            value,
            timestamp_based: false,
            global: true,
            monotonic: true,
        }
    }

    /// The legacy sum over primary and partition counters.
    pub fn summed(value: u64) -> Self {
        Self {
            value,
            timestamp_based: false,
            global: true,
            monotonic: false,
        }
    }
}

/// Create-partition request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePartitionRequest {
    pub dn: Dn,
    #[serde(default)]
    pub partial_replica: bool,
    #[serde(default = "default_backend_kind")]
    pub backend: String,
}

fn default_backend_kind() -> String {
    "memory".to_string()
}

impl CreatePartitionRequest {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            partial_replica: false,
            backend: default_backend_kind(),
        }
    }
}

/// Extended operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedOp {
    SequenceNumber(SeqNumKind),
    SchemaUpdateNow,
    CreatePartition(CreatePartitionRequest),
    StartTls,
    Other { oid: String, data: Option<Value> },
}

impl ExtendedOp {
    /// Operation OID.
    pub fn oid(&self) -> &str {
        match self {
            Self::SequenceNumber(_) => OID_SEQUENCE_NUMBER,
            Self::SchemaUpdateNow => OID_SCHEMA_UPDATE_NOW,
            Self::CreatePartition(_) => OID_CREATE_PARTITION,
            Self::StartTls => OID_START_TLS,
            Self::Other { oid, .. } => oid,
        }
    }
}

/// Extended operation response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedResponse {
    SequenceNumber(SeqNumResult),
    StartTls,
    Other { oid: String, data: Option<Value> },
}

impl ExtendedResponse {
    /// Response OID.
    pub fn oid(&self) -> &str {
        match self {
            Self::SequenceNumber(_) => OID_SEQUENCE_NUMBER,
            Self::StartTls => OID_START_TLS,
            Self::Other { oid, .. } => oid,
        }
    }
}
