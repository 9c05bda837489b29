//! Special-DN Replicator
//!
//! Writes to a replicated special DN (`@ATTRIBUTES`, `@OPTIONS`, ...) go
//! to the primary store first. Once that succeeds, the entry as it now
//! stands in the primary store is copied to every partition: deleted
//! where it no longer exists, added where missing, replaced where present.
//! Reading back the result instead of replaying the caller's operation
//! copes with partitions that have drifted out of sync.

use crate::backend::{execute, Backend, ReplySink};
use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError};
use crate::message::{
    Completion, Filter, Message, ModFlag, Operation, PartitionSelector, Reply, Request, Scope,
    SearchOp,
};
use crate::observability::{event_enabled, log_event, Event, MetricsRegistry, ObservationScope};

use super::table::{Partition, PartitionTable};

/// Copies special DNs from the primary store to every partition.
pub struct SpecialDnReplicator<'a> {
    primary: &'a dyn Backend,
    table: &'a PartitionTable,
    metrics: &'a MetricsRegistry,
}

/// Captures the primary store's terminal reply, passing the rest on.
struct PrimaryRelay<'a> {
    sink: &'a mut dyn ReplySink,
    done: Option<Completion>,
}

impl ReplySink for PrimaryRelay<'_> {
    fn send(&mut self, reply: Reply) {
        if self.done.is_some() {
            return;
        }
        match reply {
            Reply::Done(completion) => self.done = Some(completion),
            other => self.sink.send(other),
        }
    }
}

impl<'a> SpecialDnReplicator<'a> {
    pub fn new(primary: &'a dyn Backend, table: &'a PartitionTable, metrics: &'a MetricsRegistry) -> Self {
        Self {
            primary,
            table,
            metrics,
        }
    }

    /// Apply `req` to the primary store, then propagate each of `dns`.
    ///
    /// Delivers exactly one terminal reply unless the primary store
    /// refuses the request outright, in which case the refusal is
    /// returned and nothing is sent.
    pub fn write(&self, req: &Request, dns: &[Dn], sink: &mut dyn ReplySink) -> DirResult<()> {
        let completion = {
            let mut relay = PrimaryRelay { sink: &mut *sink, done: None };
            self.primary.request(req, &mut relay)?;
            relay.done
        };

        let completion = match completion {
            Some(c) if !c.is_success() => c,
            Some(mut c) => {
                for dn in dns {
                    if let Err(err) = self.propagate(req, dn) {
                        c = Completion::failed(err);
                        break;
                    }
                }
                c
            }
            None => Completion::failed(DirectoryError::operations(format!(
                "{} returned no terminal reply for {}",
                self.primary.name(),
                req.operation.name()
            ))),
        };

        sink.send(Reply::Done(completion));
        Ok(())
    }

    /// Make `dn` in every partition match the primary store.
    pub fn propagate(&self, req: &Request, dn: &Dn) -> DirResult<()> {
        self.metrics.increment_propagations();
        let dn_label = dn.linearized();
        let scope = ObservationScope::new(
            "SPECIAL_DN_PROPAGATE",
            &[("dn", &dn_label), ("op", req.operation.name())],
        );

        match self.copy_to_partitions(req, dn) {
            Ok(action) => {
                scope.complete(&[
                    ("action", action),
                    ("partitions", &self.table.len().to_string()),
                ]);
                Ok(())
            }
            Err(err) => {
                self.metrics.increment_propagation_failures();
                log_event(
                    Event::SpecialDnPropagateFailed,
                    &[("code", err.code()), ("dn", &dn_label)],
                );
                scope.fail(&err.to_string());
                Err(err)
            }
        }
    }

    fn copy_to_partitions(&self, req: &Request, dn: &Dn) -> DirResult<&'static str> {
        let lookup = req.child(Operation::Search(SearchOp {
            base: dn.clone(),
            scope: Scope::Base,
            filter: Filter::Everything,
            attrs: Vec::new(),
        }));
        let current = match execute(self.primary, &lookup) {
            Ok(found) => found.entries.into_iter().next(),
            Err(err) if err.is_no_such_object() => None,
            Err(err) => return Err(err),
        };

        match current {
            None => {
                for p in self.table {
                    match self.send(req, p, Operation::Delete(dn.clone())) {
                        Ok(()) => {}
                        Err(err) if err.is_no_such_object() => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok("delete")
            }
            Some(entry) => {
                for p in self.table {
                    match self.send(req, p, Operation::Add(entry.clone())) {
                        Ok(()) => continue,
                        Err(err) if err.is_already_exists() => {}
                        Err(err) => return Err(err),
                    }
                    let replace = replacement(&entry, &req.operation);
                    self.send(req, p, Operation::Modify(replace))?;
                }
                Ok("copy")
            }
        }
    }

    fn send(&self, parent: &Request, partition: &Partition, operation: Operation) -> DirResult<()> {
        if event_enabled(Event::SubrequestDispatch) {
            log_event(
                Event::SubrequestDispatch,
                &[("op", operation.name()), ("partition", &partition.label())],
            );
        }
        self.metrics.increment_subrequests();
        let sub = parent
            .child(operation)
            .with_selector(PartitionSelector::bound(partition.dn.clone()));
        execute(partition.backend.as_ref(), &sub).map(|_| ())
    }
}

/// The modify that overwrites an existing copy with `entry`.
///
/// Every attribute becomes a replace. Attributes the caller's modify
/// removed, and which are therefore absent from `entry`, get an empty
/// replace so they disappear from the copy too.
pub fn replacement(entry: &Message, original: &Operation) -> Message {
    let mut msg = entry.clone();
    msg.mark_all(ModFlag::Replace);
    if let Operation::Modify(changes) = original {
        for el in &changes.elements {
            if el.removes_attribute() && msg.find_element(&el.name).is_none() {
                msg.add_empty(&el.name, ModFlag::Replace);
            }
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StoreCall};
    use std::sync::Arc;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_replacement_adds_empty_replace_for_removed() {
        let entry = Message::new(dn("@OPTIONS")).with_attr("checkBaseOnSearch", &["TRUE"]);
        let changes = Message::new(dn("@OPTIONS"))
            .with_mod(ModFlag::Delete, "oldOption", &[])
            .with_mod(ModFlag::Replace, "gone", &[])
            .with_mod(ModFlag::Replace, "checkBaseOnSearch", &["TRUE"]);

        let msg = replacement(&entry, &Operation::Modify(changes));
        assert!(msg.elements.iter().all(|el| el.flag == ModFlag::Replace));
        assert_eq!(msg.values("checkBaseOnSearch"), &["TRUE".to_string()]);
        assert!(msg.find_element("oldOption").unwrap().values.is_empty());
        assert!(msg.find_element("gone").is_some());
        assert_eq!(msg.elements.len(), 3);
    }

    #[test]
    fn test_replacement_for_add_is_plain_replace() {
        let entry = Message::new(dn("@OPTIONS")).with_attr("a", &["1"]);
        let msg = replacement(&entry, &Operation::Add(entry.clone()));
        assert_eq!(msg.elements.len(), 1);
        assert_eq!(msg.elements[0].flag, ModFlag::Replace);
    }

    #[test]
    fn test_write_copies_to_every_partition() {
        let primary = MemoryBackend::new("primary");
        let p1 = Arc::new(MemoryBackend::with_root("p1", dn("dc=b,dc=a")));
        let p2 = Arc::new(MemoryBackend::with_root("p2", dn("dc=a")));
        p2.insert(Message::new(dn("@OPTIONS")).with_attr("stale", &["1"]));

        let table = PartitionTable::new(vec![
            Partition::new(dn("dc=b,dc=a"), p1.clone()),
            Partition::new(dn("dc=a"), p2.clone()),
        ])
        .unwrap();
        let metrics = MetricsRegistry::new();
        let replicator = SpecialDnReplicator::new(&primary, &table, &metrics);

        let msg = Message::new(dn("@OPTIONS")).with_attr("fresh", &["yes"]);
        let mut replies = Vec::new();
        replicator
            .write(&Request::add(msg), &[dn("@OPTIONS")], &mut replies)
            .unwrap();
        assert_eq!(replies, vec![Reply::done()]);

        assert_eq!(p1.entry(&dn("@OPTIONS")).unwrap().values("fresh"), &["yes".to_string()]);
        let copy = p2.entry(&dn("@OPTIONS")).unwrap();
        assert_eq!(copy.values("fresh"), &["yes".to_string()]);
        // Replace semantics keep attributes the primary never had
        assert_eq!(copy.values("stale"), &["1".to_string()]);
        assert_eq!(metrics.snapshot().propagations, 1);
    }

    #[test]
    fn test_failed_primary_write_skips_propagation() {
        let primary = MemoryBackend::new("primary");
        let p1 = Arc::new(MemoryBackend::with_root("p1", dn("dc=a")));
        let table = PartitionTable::new(vec![Partition::new(dn("dc=a"), p1.clone())]).unwrap();
        let metrics = MetricsRegistry::new();
        let replicator = SpecialDnReplicator::new(&primary, &table, &metrics);

        let mut replies = Vec::new();
        replicator
            .write(&Request::delete(dn("@OPTIONS")), &[dn("@OPTIONS")], &mut replies)
            .unwrap();
        assert!(matches!(&replies[..], [Reply::Done(c)] if c.status.as_ref().unwrap_err().is_no_such_object()));
        assert_eq!(metrics.snapshot().propagations, 0);
        assert!(p1.is_empty());
    }

    #[test]
    fn test_delete_tolerates_missing_copies() {
        let primary = MemoryBackend::new("primary");
        primary.insert(Message::new(dn("@OPTIONS")));
        let p1 = Arc::new(MemoryBackend::with_root("p1", dn("dc=b,dc=a")));
        let p2 = Arc::new(MemoryBackend::with_root("p2", dn("dc=a")));
        p1.insert(Message::new(dn("@OPTIONS")));
        p2.failpoints()
            .arm(StoreCall::Add, DirectoryError::busy("never reached"));

        let table = PartitionTable::new(vec![
            Partition::new(dn("dc=b,dc=a"), p1.clone()),
            Partition::new(dn("dc=a"), p2.clone()),
        ])
        .unwrap();
        let metrics = MetricsRegistry::new();
        let replicator = SpecialDnReplicator::new(&primary, &table, &metrics);

        let mut replies = Vec::new();
        replicator
            .write(&Request::delete(dn("@OPTIONS")), &[dn("@OPTIONS")], &mut replies)
            .unwrap();
        assert_eq!(replies, vec![Reply::done()]);
        assert!(!p1.contains(&dn("@OPTIONS")));
    }
}
