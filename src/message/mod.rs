//! Directory Message Model
//!
//! Requests, controls, entries and reply streams exchanged between the
//! partition layer, its caller, and the backends below it.

mod control;
mod entry;
mod extended;
mod filter;
mod reply;
mod request;

pub use control::{Controls, PartitionSelector, SearchOptions};
pub use entry::{Element, Message, ModFlag};
pub use extended::{
    CreatePartitionRequest, ExtendedOp, ExtendedResponse, SeqNumKind, SeqNumResult,
    OID_CREATE_PARTITION, OID_SCHEMA_UPDATE_NOW, OID_SEQUENCE_NUMBER, OID_START_TLS,
};
pub use filter::Filter;
pub use reply::{Completion, Reply};
pub use request::{Operation, Request, Scope, SearchOp};
