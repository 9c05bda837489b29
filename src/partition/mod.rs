//! Partitioning
//!
//! Splits one directory namespace across several backend stores, each
//! owning a subtree. The pieces:
//!
//! - `table`: the ordered partition list
//! - `router`: where a request goes
//! - `fanout`: one request over several stores, one terminal reply
//! - `replicate`: special DNs copied from the primary store to every partition
//! - `transaction`: ordered lifecycle calls across all stores
//! - `sequence`: global and legacy sequence numbers
//! - `module`: the `Backend` that ties them together
//! - `config`, `persist`: configuration and the persisted table

mod config;
mod errors;
mod fanout;
mod module;
mod persist;
mod replicate;
mod router;
mod sequence;
mod table;
mod transaction;

pub use config::{PartitionConfig, DEFAULT_REPLICATE};
pub use errors::{ConfigError, ConfigResult, TableFileError, TableFileResult};
pub use fanout::{FanoutContext, SubRequest};
pub use module::PartitionModule;
pub use persist::{PartitionTableFile, PersistedTable, TABLE_FORMAT_VERSION};
pub use replicate::{replacement, SpecialDnReplicator};
pub use router::{
    Referral, ReferralSettings, RouteDecision, Router, SearchPlan, DEFAULT_REFERRAL_SCHEME,
};
pub use sequence::SequenceTracker;
pub use table::{Partition, PartitionDescriptor, PartitionTable, DEFAULT_BACKEND_KIND};
pub use transaction::{TransactionCoordinator, TransactionState};
