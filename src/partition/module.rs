//! The partition module
//!
//! `PartitionModule` sits in front of the primary store and presents the
//! partitioned namespace as a single `Backend`. Each request is served
//! against a snapshot of the partition table taken when it arrives;
//! `create_partition` publishes a new table without disturbing requests
//! already running.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{Backend, BackendFactory, MetadataStore, ReplySink, TransactionalStore};
use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError, ErrorKind};
use crate::message::{
    Completion, CreatePartitionRequest, ExtendedOp, ExtendedResponse, Operation, Reply, Request,
    SeqNumKind, SeqNumResult,
};
use crate::observability::{event_enabled, log_event, Event, MetricsRegistry};

use super::config::PartitionConfig;
use super::fanout::FanoutContext;
use super::persist::{PartitionTableFile, PersistedTable};
use super::replicate::SpecialDnReplicator;
use super::router::{ReferralSettings, RouteDecision, Router, SearchPlan};
use super::sequence::SequenceTracker;
use super::table::{Partition, PartitionDescriptor, PartitionTable};
use super::transaction::{TransactionCoordinator, TransactionState};

pub struct PartitionModule {
    table: RwLock<Arc<PartitionTable>>,
    primary: Arc<dyn Backend>,
    metadata: Arc<dyn MetadataStore>,
    replicate: Vec<Dn>,
    referrals: ReferralSettings,
    txn: TransactionState,
    metrics: Arc<MetricsRegistry>,
    table_file: Option<PartitionTableFile>,
    factory: Option<Arc<dyn BackendFactory>>,
}

impl PartitionModule {
    /// A module over `table` with the default replicated DNs and referral settings.
    pub fn new(
        primary: Arc<dyn Backend>,
        metadata: Arc<dyn MetadataStore>,
        table: PartitionTable,
    ) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            primary,
            metadata,
            replicate: PartitionConfig::default().replicate,
            referrals: ReferralSettings::default(),
            txn: TransactionState::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            table_file: None,
            factory: None,
        }
    }

    pub fn with_replicate(mut self, replicate: Vec<Dn>) -> Self {
        self.replicate = replicate;
        self
    }

    pub fn with_referrals(mut self, referrals: ReferralSettings) -> Self {
        self.referrals = referrals;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Persist the table here whenever it changes.
    pub fn with_table_file(mut self, file: PartitionTableFile) -> Self {
        self.table_file = Some(file);
        self
    }

    /// Factory used to open backends for new partitions.
    pub fn with_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build a module from configuration.
    ///
    /// When the config names a table file that exists, its partitions and
    /// replicated DNs replace the ones in the config.
    pub fn from_config(
        config: &PartitionConfig,
        primary: Arc<dyn Backend>,
        metadata: Arc<dyn MetadataStore>,
        factory: Arc<dyn BackendFactory>,
    ) -> DirResult<Self> {
        let table_file = config.table_path.as_ref().map(PartitionTableFile::new);

        let (descriptors, replicate) = match &table_file {
            Some(file) if file.exists() => {
                let stored = file.load().map_err(|e| {
                    DirectoryError::unavailable(format!("{} ({})", e, e.code()))
                })?;
                (stored.partitions, stored.replicate)
            }
            _ => (config.partitions.clone(), config.replicate.clone()),
        };

        let mut partitions = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let backend = factory.open(&descriptor.backend, &descriptor.dn)?;
            partitions.push(Partition::from_descriptor(descriptor, backend));
        }

        let mut module = Self::new(primary, metadata, PartitionTable::new(partitions)?)
            .with_replicate(replicate)
            .with_referrals(config.referral_settings())
            .with_factory(factory);
        if let Some(file) = table_file {
            module = module.with_table_file(file);
        }
        Ok(module)
    }

    fn read_table(&self) -> RwLockReadGuard<'_, Arc<PartitionTable>> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, Arc<PartitionTable>> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current partition table.
    pub fn table(&self) -> Arc<PartitionTable> {
        Arc::clone(&self.read_table())
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn replicated_dns(&self) -> &[Dn] {
        &self.replicate
    }

    pub fn transaction_depth(&self) -> u32 {
        self.txn.depth()
    }

    fn coordinator<'a>(&'a self, table: &'a PartitionTable) -> TransactionCoordinator<'a> {
        TransactionCoordinator::new(
            self.metadata.as_ref(),
            self.primary.as_ref(),
            table,
            &self.txn,
            &self.metrics,
        )
    }

    fn tracker<'a>(&'a self, table: &'a PartitionTable) -> SequenceTracker<'a> {
        SequenceTracker::new(self.metadata.as_ref(), self.primary.as_ref(), table)
    }

    /// The legacy summed sequence number over primary and partitions.
    pub fn legacy_sequence_number(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        let table = self.table();
        self.tracker(&table).summed(kind)
    }

    /// Add a partition and publish the new table.
    ///
    /// Returns the index the partition landed at.
    pub fn create_partition(&self, descriptor: PartitionDescriptor) -> DirResult<usize> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            DirectoryError::unwilling_to_perform("no backend factory configured")
        })?;

        let mut guard = self.write_table();
        if guard.get_by_dn(&descriptor.dn).is_some() {
            return Err(DirectoryError::entry_already_exists(format!(
                "partition {} already exists",
                descriptor.dn
            )));
        }

        let backend = factory.open(&descriptor.backend, &descriptor.dn)?;
        let mut next = PartitionTable::clone(&guard);
        let index = next.insert(Partition::from_descriptor(&descriptor, Arc::clone(&backend)))?;

        // Keep the new backend balanced with the module's open transactions
        let depth = self.txn.depth();
        let mut started = 0;
        let mut outcome = Ok(());
        while started < depth {
            if let Err(err) = backend.start_transaction() {
                outcome = Err(err);
                break;
            }
            started += 1;
        }

        if outcome.is_ok() {
            if let Some(file) = &self.table_file {
                let persisted = PersistedTable::new(next.descriptors(), self.replicate.clone());
                outcome = file.save(&persisted).map_err(|e| {
                    DirectoryError::unavailable(format!("{} ({})", e, e.code()))
                });
            }
        }

        if let Err(err) = outcome {
            if started > 0 {
                self.rollback_new_backend(backend.as_ref(), started, &err);
            }
            return Err(err);
        }

        *guard = Arc::new(next);
        drop(guard);

        self.metrics.increment_partitions_created();
        log_event(
            Event::PartitionCreated,
            &[
                ("backend", &descriptor.backend),
                ("dn", &descriptor.dn.linearized()),
                ("index", &index.to_string()),
                ("partial_replica", if descriptor.partial_replica { "true" } else { "false" }),
            ],
        );
        Ok(index)
    }

    /// Abort the transactions a failed `create_partition` started on the
    /// backend it opened.
    fn rollback_new_backend(&self, backend: &dyn Backend, started: u32, cause: &DirectoryError) {
        self.metrics.increment_unwinds();
        log_event(
            Event::TxnUnwind,
            &[
                ("cause", cause.code()),
                ("failed_at", backend.name()),
                ("released", &started.to_string()),
                ("step", "delete_transaction"),
            ],
        );
        for _ in 0..started {
            if let Err(err) = backend.delete_transaction() {
                log_event(
                    Event::TxnUnwind,
                    &[
                        ("code", err.code()),
                        ("store", backend.name()),
                        ("unwind_error", &err.message),
                    ],
                );
            }
        }
    }

    fn rejected(&self, req: &Request, err: DirectoryError) -> DirectoryError {
        if err.kind() == ErrorKind::AffectsMultiplePartitions {
            self.metrics.increment_multi_partition_conflicts();
            log_event(
                Event::RenameRejected,
                &[("reason", &err.message), ("request_id", &req.id.to_string())],
            );
        }
        err
    }

    fn log_route(&self, req: &Request, decision: &str) {
        if event_enabled(Event::RouteDecision) {
            let dn = req
                .operation
                .target_dn()
                .map(Dn::linearized)
                .unwrap_or_default();
            log_event(
                Event::RouteDecision,
                &[
                    ("decision", decision),
                    ("dn", &dn),
                    ("op", req.operation.name()),
                    ("request_id", &req.id.to_string()),
                ],
            );
        }
    }

    fn fan_out(&self, req: &Request, targets: &[&Partition], referrals: Vec<String>, sink: &mut dyn ReplySink) {
        let mut ctx = FanoutContext::new(req, Arc::clone(&self.metrics)).with_referrals(referrals);
        for p in targets {
            ctx.push_partition(p);
        }
        ctx.run(sink);
    }

    fn search(&self, table: &PartitionTable, req: &Request, sink: &mut dyn ReplySink) -> DirResult<()> {
        let router = Router::new(table, &self.replicate, &self.referrals);
        let plan = router.plan_search(req).map_err(|e| self.rejected(req, e))?;
        self.log_route(req, plan_kind(&plan));

        match plan {
            SearchPlan::Direct(p) => {
                self.metrics.increment_routed_single();
                p.backend.request(req, sink)
            }
            SearchPlan::PrimaryStore => {
                self.metrics.increment_routed_primary();
                self.primary.request(req, sink)
            }
            SearchPlan::Fanout { targets, referrals } => {
                self.metrics.increment_routed_fanout();
                let uris = referrals.into_iter().map(|r| r.uri).collect();
                self.fan_out(req, &targets, uris, sink);
                Ok(())
            }
        }
    }

    fn extended(
        &self,
        table: &PartitionTable,
        req: &Request,
        op: &ExtendedOp,
        sink: &mut dyn ReplySink,
    ) -> DirResult<()> {
        match op {
            ExtendedOp::SchemaUpdateNow => {
                let reply = match self.metadata.increment_schema_sequence() {
                    Ok(seq) => {
                        log_event(Event::SchemaUpdated, &[("schema_sequence", &seq.to_string())]);
                        Reply::done()
                    }
                    Err(err) => Reply::failed(err),
                };
                sink.send(reply);
                Ok(())
            }
            ExtendedOp::SequenceNumber(kind) => {
                let result = self.tracker(table).global(*kind)?;
                sink.send(Reply::Done(
                    Completion::success().with_response(ExtendedResponse::SequenceNumber(result)),
                ));
                Ok(())
            }
            ExtendedOp::CreatePartition(create) => {
                self.create_partition(descriptor_for(create))?;
                sink.send(Reply::done());
                Ok(())
            }
            _ if table.is_empty() => {
                self.log_route(req, RouteDecision::PrimaryStore.kind());
                self.metrics.increment_routed_primary();
                self.primary.request(req, sink)
            }
            _ => {
                self.log_route(req, RouteDecision::AllPartitions.kind());
                self.metrics.increment_routed_fanout();
                let targets: Vec<&Partition> = table.iter().collect();
                self.fan_out(req, &targets, Vec::new(), sink);
                Ok(())
            }
        }
    }

    /// Special DNs a replicated write touches.
    fn replicated_targets(&self, req: &Request, dn: Dn, router: &Router<'_>) -> Vec<Dn> {
        let mut dns = vec![dn];
        if let Operation::Rename { new, .. } = &req.operation {
            if router.is_replicated(new) && !dns.contains(new) {
                dns.push(new.clone());
            }
        }
        dns
    }
}

fn plan_kind(plan: &SearchPlan<'_>) -> &'static str {
    match plan {
        SearchPlan::Direct(_) => "direct",
        SearchPlan::PrimaryStore => "primary_store",
        SearchPlan::Fanout { .. } => "fanout",
    }
}

fn descriptor_for(create: &CreatePartitionRequest) -> PartitionDescriptor {
    PartitionDescriptor {
        dn: create.dn.clone(),
        partial_replica: create.partial_replica,
        backend: create.backend.clone(),
    }
}

impl TransactionalStore for PartitionModule {
    fn name(&self) -> &str {
        "partition"
    }

    fn start_transaction(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).start()
    }

    fn prepare_commit(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).prepare_commit()
    }

    fn end_transaction(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).end()
    }

    fn delete_transaction(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).delete()
    }

    fn read_lock(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).read_lock()
    }

    fn read_unlock(&self) -> DirResult<()> {
        let table = self.table();
        self.coordinator(&table).read_unlock()
    }
}

impl Backend for PartitionModule {
    fn request(&self, req: &Request, sink: &mut dyn ReplySink) -> DirResult<()> {
        let table = self.table();

        match &req.operation {
            Operation::Extended(op) => return self.extended(&table, req, op, sink),
            Operation::Search(_) => return self.search(&table, req, sink),
            _ => {}
        }

        let router = Router::new(&table, &self.replicate, &self.referrals);
        let decision = router.route(req).map_err(|e| self.rejected(req, e))?;
        self.log_route(req, decision.kind());

        match decision {
            RouteDecision::SinglePartition(p) => {
                self.metrics.increment_routed_single();
                self.fan_out(req, &[p], Vec::new(), sink);
                Ok(())
            }
            RouteDecision::AllPartitions => {
                self.metrics.increment_routed_fanout();
                let targets: Vec<&Partition> = table.iter().collect();
                self.fan_out(req, &targets, Vec::new(), sink);
                Ok(())
            }
            RouteDecision::Replicate(dn) => {
                self.metrics.increment_routed_replicate();
                let dns = self.replicated_targets(req, dn, &router);
                SpecialDnReplicator::new(self.primary.as_ref(), &table, &self.metrics)
                    .write(req, &dns, sink)
            }
            RouteDecision::PrimaryStore => {
                self.metrics.increment_routed_primary();
                self.primary.request(req, sink)
            }
        }
    }

    fn sequence_number(&self, kind: SeqNumKind) -> DirResult<SeqNumResult> {
        let table = self.table();
        self.tracker(&table).global(kind)
    }
}
