//! CLI argument definitions using clap
//!
//! Commands:
//! - dirpart init --config <path>
//! - dirpart partitions --config <path>
//! - dirpart route --config <path> --op <op> --dn <dn> [--new-dn <dn>]
//! - dirpart plan-search --config <path> --base <dn> --scope <scope>
//! - dirpart create-partition --config <path> --dn <dn>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::message::Scope;

/// dirpart - directory namespace partitioning
#[derive(Parser, Debug)]
#[command(name = "dirpart")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Write operation to route.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Modify,
    Delete,
    Rename,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    Base,
    One,
    Sub,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Base => Scope::Base,
            ScopeArg::One => Scope::OneLevel,
            ScopeArg::Sub => Scope::Subtree,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./dirpart.json")]
        config: PathBuf,
    },

    /// List partitions in match order
    Partitions {
        /// Path to configuration file
        #[arg(long, default_value = "./dirpart.json")]
        config: PathBuf,
    },

    /// Show where a write would be routed
    Route {
        /// Path to configuration file
        #[arg(long, default_value = "./dirpart.json")]
        config: PathBuf,

        #[arg(long, value_enum)]
        op: WriteOp,

        /// Target DN (the old DN for a rename)
        #[arg(long)]
        dn: String,

        /// New DN, for a rename
        #[arg(long)]
        new_dn: Option<String>,
    },

    /// Show which partitions a search would visit
    PlanSearch {
        /// Path to configuration file
        #[arg(long, default_value = "./dirpart.json")]
        config: PathBuf,

        /// Search base DN
        #[arg(long)]
        base: String,

        #[arg(long, value_enum, default_value = "sub")]
        scope: ScopeArg,

        /// Expand into every partition below the base
        #[arg(long)]
        phantom_root: bool,

        /// Suppress referrals to partitions below the base
        #[arg(long)]
        domain_scope: bool,

        /// Skip partial replicas
        #[arg(long)]
        no_gc: bool,
    },

    /// Add a partition and persist the table
    CreatePartition {
        /// Path to configuration file
        #[arg(long, default_value = "./dirpart.json")]
        config: PathBuf,

        /// Partition root DN
        #[arg(long)]
        dn: String,

        #[arg(long)]
        partial_replica: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
