//! CLI module for dirpart
//!
//! Provides command-line interface for:
//! - init: Write a default configuration
//! - partitions: List the partition table
//! - route: Show the routing decision for a write
//! - plan-search: Show the targets and referrals of a search
//! - create-partition: Add a partition and persist the table

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, ScopeArg, WriteOp};
pub use commands::{
    create_partition, init, partitions, plan_search, route, run, run_command, LOG_ENV,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_envelope, response_envelope, write_error, write_response};
