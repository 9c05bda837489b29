//! Partition Table Persistence Tests
//!
//! A module built from a configuration with a `table_path` writes every
//! table change to that file, and a later module built from the same
//! configuration comes back with the same table in the same order.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::dn;
use dirpart::backend::{execute, CallJournal, MemoryBackend, MemoryBackendFactory, MemoryMetadataStore};
use dirpart::error::ErrorKind;
use dirpart::message::{CreatePartitionRequest, ExtendedOp, Message, Request};
use dirpart::partition::{
    PartitionConfig, PartitionDescriptor, PartitionModule, PartitionTableFile, TABLE_FORMAT_VERSION,
};

fn config_with_table(dir: &Path) -> PartitionConfig {
    PartitionConfig {
        partitions: vec![PartitionDescriptor::new(dn("dc=example,dc=com"))],
        table_path: Some(dir.join("partitions.json")),
        ..PartitionConfig::default()
    }
}

fn open(config: &PartitionConfig) -> dirpart::error::DirResult<PartitionModule> {
    open_with(config, CallJournal::new())
}

fn open_with(config: &PartitionConfig, journal: CallJournal) -> dirpart::error::DirResult<PartitionModule> {
    PartitionModule::from_config(
        config,
        Arc::new(MemoryBackend::new("primary")),
        Arc::new(MemoryMetadataStore::new()),
        Arc::new(MemoryBackendFactory::with_journal(journal)),
    )
}

fn roots(module: &PartitionModule) -> Vec<String> {
    module.table().iter().map(|p| p.dn.linearized()).collect()
}

// =============================================================================
// SAVE AND RELOAD
// =============================================================================

/// Test: Created partitions survive a restart in table order.
#[test]
fn test_created_partitions_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());

    let module = open(&config).unwrap();
    assert_eq!(module.create_partition(PartitionDescriptor::new(dn("ou=sales,dc=example,dc=com"))).unwrap(), 0);
    module
        .create_partition(PartitionDescriptor::new(dn("dc=other")).partial())
        .unwrap();
    let before = roots(&module);
    assert_eq!(
        before,
        vec!["ou=sales,dc=example,dc=com", "dc=example,dc=com", "dc=other"]
    );
    drop(module);

    let reopened = open(&config).unwrap();
    assert_eq!(roots(&reopened), before);
    assert!(reopened.table().get(2).unwrap().partial_replica);
    assert_eq!(reopened.replicated_dns(), config.replicate.as_slice());
}

/// Test: The table file is written with the current format version.
#[test]
fn test_table_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());
    let module = open(&config).unwrap();
    module
        .create_partition(PartitionDescriptor::new(dn("ou=sales,dc=example,dc=com")))
        .unwrap();

    let stored = PartitionTableFile::new(dir.path().join("partitions.json")).load().unwrap();
    assert_eq!(stored.format_version, TABLE_FORMAT_VERSION);
    assert_eq!(stored.partitions.len(), 2);
    assert!(!dir.path().join("partitions.json.tmp").exists());
}

/// Test: The extended operation goes through the same persisted path.
#[test]
fn test_create_partition_extended_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());
    let module = open(&config).unwrap();

    let req = Request::extended(ExtendedOp::CreatePartition(CreatePartitionRequest::new(dn(
        "cn=config,dc=example,dc=com",
    ))));
    execute(&module, &req).unwrap();

    let reopened = open(&config).unwrap();
    assert_eq!(
        roots(&reopened),
        vec!["cn=config,dc=example,dc=com", "dc=example,dc=com"]
    );
}

/// Test: A new partition receives writes routed to it right away.
#[test]
fn test_created_partition_takes_writes() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());
    let journal = CallJournal::new();
    let module = open_with(&config, journal.clone()).unwrap();

    module
        .create_partition(PartitionDescriptor::new(dn("ou=sales,dc=example,dc=com")))
        .unwrap();
    execute(&module, &Request::add(Message::new(dn("cn=x,ou=sales,dc=example,dc=com")))).unwrap();
    assert_eq!(journal.entries(), vec!["ou=sales,dc=example,dc=com:add"]);
}

// =============================================================================
// FAILURES
// =============================================================================

/// Test: A duplicate root is refused and the file is left alone.
#[test]
fn test_duplicate_partition_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());
    let module = open(&config).unwrap();

    let err = module
        .create_partition(PartitionDescriptor::new(dn("dc=example,dc=com")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntryAlreadyExists);
    assert!(!dir.path().join("partitions.json").exists());
}

/// Test: A corrupted table file stops the module from starting.
#[test]
fn test_corrupted_table_file_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_table(dir.path());
    open(&config)
        .unwrap()
        .create_partition(PartitionDescriptor::new(dn("dc=other")))
        .unwrap();

    let path = dir.path().join("partitions.json");
    let body = fs::read_to_string(&path).unwrap();
    fs::write(&path, body.replace("dc=other", "dc=evil")).unwrap();

    let err = match open(&config) {
        Ok(_) => panic!("tampered table file was accepted"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.message.contains("DIRPART_TABLE_CHECKSUM"));
}

/// Test: A save failure leaves the published table unchanged.
#[test]
fn test_save_failure_keeps_old_table() {
    let dir = tempfile::tempdir().unwrap();
    // a directory in place of the file makes the rename fail
    let blocked = dir.path().join("partitions.json");
    fs::create_dir(&blocked).unwrap();
    fs::write(blocked.join("keep"), b"x").unwrap();

    let config = PartitionConfig {
        partitions: vec![PartitionDescriptor::new(dn("dc=example,dc=com"))],
        table_path: Some(dir.path().join("fresh.json")),
        ..PartitionConfig::default()
    };
    let module = open(&config).unwrap();
    let module = module.with_table_file(PartitionTableFile::new(blocked));

    let err = module
        .create_partition(PartitionDescriptor::new(dn("dc=other")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(roots(&module), vec!["dc=example,dc=com"]);
    assert_eq!(module.metrics().snapshot().partitions_created, 0);
}
