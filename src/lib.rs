//! dirpart - Directory namespace partitioning
//!
//! Presents several backend stores, each owning one subtree, as a single
//! directory. Requests are routed to the owning store, fanned out when
//! they span stores, and special DNs are kept identical everywhere.

pub mod backend;
pub mod cli;
pub mod dn;
pub mod error;
pub mod message;
pub mod observability;
pub mod partition;
