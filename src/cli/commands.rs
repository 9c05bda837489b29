//! CLI command implementations
//!
//! Each command loads the configuration, builds a partition module over
//! in-memory stores and reports what the partition layer would do. The
//! commands return their `data` payload; `run` wraps it in the JSON
//! envelope.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::backend::{MemoryBackend, MemoryBackendFactory, MemoryMetadataStore};
use crate::dn::Dn;
use crate::message::{Controls, Filter, Message, Request, SearchOptions};
use crate::observability::{Logger, Severity};
use crate::partition::{PartitionConfig, PartitionDescriptor, PartitionModule, Router};

use super::args::{Command, ScopeArg, WriteOp};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Environment variable holding the minimum log severity.
pub const LOG_ENV: &str = "DIRPART_LOG";

/// Main CLI entry point
///
/// Parses arguments, runs the command and writes one JSON envelope.
pub fn run() -> CliResult<()> {
    configure_logging();
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Log lines share stdout with the response, so only warnings and above
/// are written unless `DIRPART_LOG` asks for more.
fn configure_logging() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| Severity::parse(&s))
        .unwrap_or(Severity::Warn);
    Logger::set_min_severity(level);
}

/// Run a command and return its `data` payload.
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Partitions { config } => partitions(&config),
        Command::Route {
            config,
            op,
            dn,
            new_dn,
        } => route(&config, op, &dn, new_dn.as_deref()),
        Command::PlanSearch {
            config,
            base,
            scope,
            phantom_root,
            domain_scope,
            no_gc,
        } => plan_search(&config, &base, scope, phantom_root, domain_scope, no_gc),
        Command::CreatePartition {
            config,
            dn,
            partial_replica,
        } => create_partition(&config, &dn, partial_replica),
    }
}

fn parse_dn(s: &str) -> CliResult<Dn> {
    Dn::parse(s).map_err(|e| CliError::invalid_argument(e.message))
}

/// Build a module over in-memory stores.
fn open_module(config: &PartitionConfig) -> CliResult<PartitionModule> {
    let module = PartitionModule::from_config(
        config,
        Arc::new(MemoryBackend::new("primary")),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(MemoryBackendFactory::new()),
    )?;
    Ok(module)
}

/// Write a default configuration file.
pub fn init(config_path: &Path) -> CliResult<Value> {
    if config_path.exists() {
        return Err(CliError::already_initialized(config_path));
    }
    let config = PartitionConfig::default();
    config.save(config_path)?;
    Ok(json!({
        "initialized": true,
        "config": config_path.display().to_string(),
    }))
}

/// List the partition table in match order.
pub fn partitions(config_path: &Path) -> CliResult<Value> {
    let config = PartitionConfig::load(config_path)?;
    let module = open_module(&config)?;
    let table = module.table();

    let rows: Vec<Value> = table
        .iter()
        .enumerate()
        .map(|(index, p)| {
            json!({
                "index": index,
                "dn": p.dn.linearized(),
                "partial_replica": p.partial_replica,
                "backend": p.kind,
            })
        })
        .collect();
    let replicate: Vec<String> = module.replicated_dns().iter().map(Dn::linearized).collect();

    Ok(json!({ "partitions": rows, "replicate": replicate }))
}

/// Report the routing decision for a write.
pub fn route(config_path: &Path, op: WriteOp, dn: &str, new_dn: Option<&str>) -> CliResult<Value> {
    let config = PartitionConfig::load(config_path)?;
    let module = open_module(&config)?;
    let target = parse_dn(dn)?;

    let req = match op {
        WriteOp::Add => Request::add(Message::new(target)),
        WriteOp::Modify => Request::modify(Message::new(target)),
        WriteOp::Delete => Request::delete(target),
        WriteOp::Rename => {
            let new_dn = new_dn
                .ok_or_else(|| CliError::invalid_argument("rename needs --new-dn"))?;
            Request::rename(target, parse_dn(new_dn)?)
        }
    };

    let table = module.table();
    let settings = config.referral_settings();
    let router = Router::new(&table, module.replicated_dns(), &settings);
    let decision = router.route(&req)?;
    Ok(decision.to_json())
}

/// Report the partitions and referrals a search would produce.
pub fn plan_search(
    config_path: &Path,
    base: &str,
    scope: ScopeArg,
    phantom_root: bool,
    domain_scope: bool,
    no_gc: bool,
) -> CliResult<Value> {
    let config = PartitionConfig::load(config_path)?;
    let module = open_module(&config)?;

    let controls = Controls {
        search_options: Some(SearchOptions {
            domain_scope,
            phantom_root,
        }),
        no_global_catalog: no_gc,
        ..Controls::default()
    };
    let req = Request::search(parse_dn(base)?, scope.into(), Filter::Everything)
        .with_controls(controls);

    let table = module.table();
    let settings = config.referral_settings();
    let router = Router::new(&table, module.replicated_dns(), &settings);
    let plan = router.plan_search(&req)?;
    Ok(plan.to_json())
}

/// Add a partition and persist the result.
///
/// With a `table_path` configured the table file is rewritten; otherwise
/// the partition list in the config file is.
pub fn create_partition(config_path: &Path, dn: &str, partial_replica: bool) -> CliResult<Value> {
    let mut config = PartitionConfig::load(config_path)?;
    let module = open_module(&config)?;

    let mut descriptor = PartitionDescriptor::new(parse_dn(dn)?);
    descriptor.partial_replica = partial_replica;
    let index = module.create_partition(descriptor)?;

    let persisted_to = match &config.table_path {
        Some(path) => path.display().to_string(),
        None => {
            config.partitions = module.table().descriptors();
            config.save(config_path)?;
            config_path.display().to_string()
        }
    };

    Ok(json!({
        "created": dn,
        "index": index,
        "partitions": module.table().len(),
        "persisted_to": persisted_to,
    }))
}
