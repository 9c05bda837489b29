//! Router
//!
//! Decides where a request goes: one partition, every partition, the
//! special-DN replication path, or straight through to the primary store.
//! Searches get a `SearchPlan` instead, which also carries the referrals
//! the domain-scope policy generates.
//!
//! Both decisions depend on the table's ordering precondition (nested
//! partitions before their ancestors): the scan stops at the first
//! ancestor-or-equal match.

use serde_json::{json, Value};

use crate::dn::Dn;
use crate::error::{DirResult, DirectoryError};
use crate::message::{Controls, Operation, Request, Scope, SearchOp};

use super::table::{Partition, PartitionTable};

/// Default scheme for generated referrals.
pub const DEFAULT_REFERRAL_SCHEME: &str = "ldap";

/// How referral URIs are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralSettings {
    pub scheme: String,
    pub dns_domain: String,
}

impl ReferralSettings {
    pub fn new(dns_domain: impl Into<String>) -> Self {
        Self {
            scheme: DEFAULT_REFERRAL_SCHEME.to_string(),
            dns_domain: dns_domain.into(),
        }
    }

    /// `<scheme>://<domain>/<dn>[??base]`
    pub fn uri(&self, target: &Dn, scope: Scope) -> String {
        let suffix = if scope == Scope::OneLevel { "??base" } else { "" };
        format!(
            "{}://{}/{}{}",
            self.scheme,
            self.dns_domain,
            target.linearized(),
            suffix
        )
    }
}

impl Default for ReferralSettings {
    fn default() -> Self {
        Self::new("localdomain")
    }
}

/// A referral to a partition below a search base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    pub target: Dn,
    pub uri: String,
}

/// Where a non-search request goes.
#[derive(Debug, Clone)]
pub enum RouteDecision<'a> {
    SinglePartition(&'a Partition),
    AllPartitions,
    /// Write to a special DN, replicated to every partition
    Replicate(Dn),
    PrimaryStore,
}

impl RouteDecision<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            RouteDecision::SinglePartition(_) => "single_partition",
            RouteDecision::AllPartitions => "all_partitions",
            RouteDecision::Replicate(_) => "replicate",
            RouteDecision::PrimaryStore => "primary_store",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RouteDecision::SinglePartition(p) => {
                json!({ "decision": self.kind(), "partition": p.label() })
            }
            RouteDecision::Replicate(dn) => json!({ "decision": self.kind(), "dn": dn.linearized() }),
            _ => json!({ "decision": self.kind() }),
        }
    }
}

/// Where a search goes.
#[derive(Debug, Clone)]
pub enum SearchPlan<'a> {
    /// The selector control named the partition
    Direct(&'a Partition),
    /// Nothing matched; the primary store answers alone
    PrimaryStore,
    /// One sub-search per target, in table order, then the referrals
    Fanout {
        targets: Vec<&'a Partition>,
        referrals: Vec<Referral>,
    },
}

impl SearchPlan<'_> {
    pub fn referrals(&self) -> &[Referral] {
        match self {
            SearchPlan::Direct(_) | SearchPlan::PrimaryStore => &[],
            SearchPlan::Fanout { referrals, .. } => referrals,
        }
    }

    pub fn to_json(&self) -> Value {
        let referrals: Vec<&str> = self.referrals().iter().map(|r| r.uri.as_str()).collect();
        match self {
            SearchPlan::Direct(p) => json!({ "plan": "direct", "targets": [p.label()] }),
            SearchPlan::PrimaryStore => {
                json!({ "plan": "primary_store", "targets": [], "referrals": referrals })
            }
            SearchPlan::Fanout { targets, .. } => {
                let targets: Vec<String> = targets.iter().map(|p| p.label()).collect();
                json!({ "plan": "fanout", "targets": targets, "referrals": referrals })
            }
        }
    }
}

/// Routes requests over one table snapshot.
pub struct Router<'a> {
    table: &'a PartitionTable,
    replicate: &'a [Dn],
    referrals: &'a ReferralSettings,
}

impl<'a> Router<'a> {
    pub fn new(table: &'a PartitionTable, replicate: &'a [Dn], referrals: &'a ReferralSettings) -> Self {
        Self {
            table,
            replicate,
            referrals,
        }
    }

    /// First partition covering `dn`, or the selector's DN if one is bound.
    pub fn find_partition(&self, dn: Option<&Dn>, controls: &Controls) -> Option<&'a Partition> {
        let dn = controls.selected_partition().or(dn)?;
        self.table.owner_of(dn)
    }

    /// Special DN that must be identical in every partition.
    pub fn is_replicated(&self, dn: &Dn) -> bool {
        dn.is_special() && self.replicate.iter().any(|r| r == dn)
    }

    /// Route any request.
    pub fn route(&self, req: &Request) -> DirResult<RouteDecision<'a>> {
        match &req.operation {
            Operation::Search(_) => Ok(match self.plan_search(req)? {
                SearchPlan::Direct(p) => RouteDecision::SinglePartition(p),
                SearchPlan::PrimaryStore => RouteDecision::PrimaryStore,
                SearchPlan::Fanout { .. } => RouteDecision::AllPartitions,
            }),
            Operation::Add(msg) | Operation::Modify(msg) => self.route_write(&msg.dn, &req.controls),
            Operation::Delete(dn) => self.route_write(dn, &req.controls),
            Operation::Rename { old, new } => self.route_rename(old, new, &req.controls),
            Operation::Extended(_) if self.table.is_empty() => Ok(RouteDecision::PrimaryStore),
            Operation::Extended(_) => Ok(RouteDecision::AllPartitions),
        }
    }

    /// Route an add, modify or delete of `dn`.
    pub fn route_write(&self, dn: &Dn, controls: &Controls) -> DirResult<RouteDecision<'a>> {
        if self.table.is_empty() {
            return Ok(RouteDecision::PrimaryStore);
        }
        if dn.is_null() && controls.selected_partition().is_none() {
            return Err(DirectoryError::no_such_object(
                "cannot write to the null DN",
            ));
        }
        if self.is_replicated(dn) {
            return Ok(RouteDecision::Replicate(dn.clone()));
        }
        Ok(match self.find_partition(Some(dn), controls) {
            Some(p) => RouteDecision::SinglePartition(p),
            None => RouteDecision::PrimaryStore,
        })
    }

    /// Route a rename; both ends must resolve to the same place.
    pub fn route_rename(&self, old: &Dn, new: &Dn, controls: &Controls) -> DirResult<RouteDecision<'a>> {
        if self.table.is_empty() {
            return Ok(RouteDecision::PrimaryStore);
        }
        let from = self.find_partition(Some(old), controls);
        let to = self.find_partition(Some(new), controls);
        match (from, to) {
            (Some(a), Some(b)) if a.dn != b.dn => {
                return Err(DirectoryError::affects_multiple_partitions(format!(
                    "cannot rename {} in {} to {} in {}",
                    old, a.dn, new, b.dn
                )))
            }
            (Some(p), None) | (None, Some(p)) => {
                return Err(DirectoryError::affects_multiple_partitions(format!(
                    "cannot rename {} to {}: only one end is in partition {}",
                    old, new, p.dn
                )))
            }
            _ => {}
        }
        self.route_write(old, controls)
    }

    /// Plan a search.
    pub fn plan_search(&self, req: &Request) -> DirResult<SearchPlan<'a>> {
        let op = req
            .as_search()
            .ok_or_else(|| DirectoryError::operations("plan_search called with a non-search request"))?;
        let controls = &req.controls;

        if controls.selected_partition().is_some() {
            if let Some(p) = self.find_partition(None, controls) {
                return Ok(SearchPlan::Direct(p));
            }
        }

        if self.table.is_empty() || op.base.is_special() {
            return Ok(SearchPlan::PrimaryStore);
        }

        let domain_scope = controls.wants_domain_scope();
        let phantom_root = controls.wants_phantom_root();

        if op.base.is_null() {
            if !phantom_root {
                return Err(DirectoryError::no_such_object("empty base DN"));
            }
            return Ok(SearchPlan::Fanout {
                targets: self.table.iter().filter(|p| in_scope_below(p, op)).collect(),
                referrals: Vec::new(),
            });
        }

        let mut targets = Vec::new();
        let mut referrals: Vec<Referral> = Vec::new();

        for p in self.table {
            if p.partial_replica && controls.no_global_catalog && p.dn.is_base_of(&op.base) {
                continue;
            }

            let (matched, stop) = if phantom_root {
                phantom_match(p, op)
            } else {
                if !domain_scope && op.scope != Scope::Base && op.base.is_ancestor_of(&p.dn) {
                    // Keep only the referral closest to the base
                    referrals.retain(|r| !p.dn.is_base_of(&r.target));
                    referrals.push(Referral {
                        target: p.dn.clone(),
                        uri: self.referrals.uri(&p.dn, op.scope),
                    });
                }
                let covers = p.dn.is_base_of(&op.base);
                (covers, covers)
            };

            if matched {
                targets.push(p);
            }
            if stop {
                break;
            }
        }

        // The primary store answers unmatched searches directly, without referrals
        if targets.is_empty() {
            return Ok(SearchPlan::PrimaryStore);
        }
        Ok(SearchPlan::Fanout { targets, referrals })
    }
}

/// Phantom-root inclusion: (matched, stop scanning).
fn phantom_match(p: &Partition, op: &SearchOp) -> (bool, bool) {
    if p.dn == op.base {
        return (true, true);
    }
    if op.base.is_base_of(&p.dn) && op.scope != Scope::Base {
        return (in_scope_below(p, op), false);
    }
    if p.dn.is_base_of(&op.base) {
        return (true, true);
    }
    (false, false)
}

/// Whether a partition rooted below the base holds anything in scope.
///
/// One-level searches only reach a root that is a child of the base.
fn in_scope_below(p: &Partition, op: &SearchOp) -> bool {
    op.scope != Scope::OneLevel || p.dn.parent().as_ref() == Some(&op.base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::message::{Filter, PartitionSelector, SearchOptions};
    use std::sync::Arc;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn table(roots: &[&str]) -> PartitionTable {
        PartitionTable::new(
            roots
                .iter()
                .map(|r| Partition::new(dn(r), Arc::new(MemoryBackend::with_root(*r, dn(r)))))
                .collect(),
        )
        .unwrap()
    }

    fn replicate() -> Vec<Dn> {
        vec![dn("@ATTRIBUTES"), dn("@OPTIONS")]
    }

    fn settings() -> ReferralSettings {
        ReferralSettings::new("example.com")
    }

    fn targets(plan: &SearchPlan<'_>) -> Vec<String> {
        match plan {
            SearchPlan::Fanout { targets, .. } => targets.iter().map(|p| p.label()).collect(),
            SearchPlan::Direct(p) => vec![p.label()],
            SearchPlan::PrimaryStore => Vec::new(),
        }
    }

    #[test]
    fn test_write_routes_to_owner() {
        let t = table(&["cn=config,dc=example,dc=com", "dc=example,dc=com"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let decision = router
            .route_write(&dn("cn=x,cn=config,dc=example,dc=com"), &Controls::default())
            .unwrap();
        match decision {
            RouteDecision::SinglePartition(p) => assert_eq!(p.dn, dn("cn=config,dc=example,dc=com")),
            other => panic!("unexpected {:?}", other),
        }

        let decision = router.route_write(&dn("dc=org"), &Controls::default()).unwrap();
        assert!(matches!(decision, RouteDecision::PrimaryStore));

        let decision = router.route_write(&dn("@OPTIONS"), &Controls::default()).unwrap();
        assert!(matches!(decision, RouteDecision::Replicate(_)));

        let decision = router.route_write(&dn("@INDEXLIST"), &Controls::default()).unwrap();
        assert!(matches!(decision, RouteDecision::PrimaryStore));

        assert!(router
            .route_write(&Dn::null(), &Controls::default())
            .unwrap_err()
            .is_no_such_object());
    }

    #[test]
    fn test_selector_overrides_dn() {
        let t = table(&["cn=config,dc=example,dc=com", "dc=example,dc=com"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let req = Request::delete(dn("cn=x,cn=config,dc=example,dc=com"))
            .with_selector(PartitionSelector::bound(dn("dc=example,dc=com")));
        match router.route(&req).unwrap() {
            RouteDecision::SinglePartition(p) => assert_eq!(p.dn, dn("dc=example,dc=com")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_table_passes_through() {
        let t = PartitionTable::empty();
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let req = Request::delete(dn("@OPTIONS"));
        assert!(matches!(router.route(&req).unwrap(), RouteDecision::PrimaryStore));
    }

    #[test]
    fn test_rename_rules() {
        let t = table(&["cn=config,dc=example,dc=com", "dc=example,dc=com"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let none = Controls::default();

        let err = router
            .route_rename(
                &dn("cn=a,cn=config,dc=example,dc=com"),
                &dn("cn=a,dc=example,dc=com"),
                &none,
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AffectsMultiplePartitions);

        let err = router
            .route_rename(&dn("cn=a,dc=example,dc=com"), &dn("cn=a,dc=org"), &none)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AffectsMultiplePartitions);

        let ok = router
            .route_rename(&dn("cn=a,dc=example,dc=com"), &dn("cn=b,dc=example,dc=com"), &none)
            .unwrap();
        assert!(matches!(ok, RouteDecision::SinglePartition(_)));

        let ok = router.route_rename(&dn("cn=a,dc=org"), &dn("cn=b,dc=org"), &none).unwrap();
        assert!(matches!(ok, RouteDecision::PrimaryStore));
    }

    fn search(base: &str, scope: Scope, options: SearchOptions) -> Request {
        Request::search(dn(base), scope, Filter::Everything).with_controls(Controls {
            search_options: Some(options),
            ..Default::default()
        })
    }

    #[test]
    fn test_phantom_root_inclusion_sets() {
        let t = table(&["dc=b,dc=a", "dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let phantom = SearchOptions {
            domain_scope: false,
            phantom_root: true,
        };

        let sub = router.plan_search(&search("dc=a", Scope::Subtree, phantom)).unwrap();
        assert_eq!(targets(&sub), vec!["dc=b,dc=a", "dc=a"]);

        let one = router.plan_search(&search("dc=a", Scope::OneLevel, phantom)).unwrap();
        assert_eq!(targets(&one), vec!["dc=b,dc=a", "dc=a"]);

        let base = router.plan_search(&search("dc=a", Scope::Base, phantom)).unwrap();
        assert_eq!(targets(&base), vec!["dc=a"]);

        // A base inside the nested partition stops at it
        let inner = router
            .plan_search(&search("cn=x,dc=b,dc=a", Scope::Subtree, phantom))
            .unwrap();
        assert_eq!(targets(&inner), vec!["dc=b,dc=a"]);
    }

    #[test]
    fn test_phantom_one_level_skips_grandchild_partitions() {
        let t = table(&["dc=c,dc=b,dc=a", "dc=b,dc=a", "dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let phantom = SearchOptions {
            domain_scope: false,
            phantom_root: true,
        };

        let one = router.plan_search(&search("dc=a", Scope::OneLevel, phantom)).unwrap();
        assert_eq!(targets(&one), vec!["dc=b,dc=a", "dc=a"]);

        let sub = router.plan_search(&search("dc=a", Scope::Subtree, phantom)).unwrap();
        assert_eq!(targets(&sub), vec!["dc=c,dc=b,dc=a", "dc=b,dc=a", "dc=a"]);
    }

    #[test]
    fn test_phantom_root_null_base_hits_everything() {
        let t = table(&["dc=b,dc=a", "dc=a", "dc=org"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let phantom = SearchOptions {
            domain_scope: false,
            phantom_root: true,
        };
        let plan = router.plan_search(&search("", Scope::Subtree, phantom)).unwrap();
        assert_eq!(targets(&plan).len(), 3);

        let err = router
            .plan_search(&search("", Scope::Subtree, SearchOptions::default()))
            .unwrap_err();
        assert!(err.is_no_such_object());
    }

    #[test]
    fn test_domain_scope_referrals() {
        let t = table(&["dc=x,dc=b,dc=a", "dc=b,dc=a", "dc=c,dc=a", "dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let plan = router
            .plan_search(&search("dc=a", Scope::Subtree, SearchOptions::default()))
            .unwrap();
        assert_eq!(targets(&plan), vec!["dc=a"]);
        let uris: Vec<&str> = plan.referrals().iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec!["ldap://example.com/dc=b,dc=a", "ldap://example.com/dc=c,dc=a"]
        );

        let plan = router
            .plan_search(&search("dc=a", Scope::OneLevel, SearchOptions::default()))
            .unwrap();
        assert_eq!(plan.referrals()[0].uri, "ldap://example.com/dc=b,dc=a??base");

        let plan = router
            .plan_search(&search("dc=a", Scope::Base, SearchOptions::default()))
            .unwrap();
        assert!(plan.referrals().is_empty());
    }

    #[test]
    fn test_unmatched_search_falls_back_without_referrals() {
        let t = table(&["dc=b,dc=a", "dc=c,dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let plan = router
            .plan_search(&search("dc=a", Scope::Subtree, SearchOptions::default()))
            .unwrap();
        assert!(matches!(plan, SearchPlan::PrimaryStore));
        assert!(plan.referrals().is_empty());
        assert_eq!(plan.to_json()["referrals"], serde_json::json!([]));
    }

    #[test]
    fn test_domain_scope_control_suppresses_referrals() {
        let t = table(&["dc=b,dc=a", "dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);
        let req = Request::search(dn("dc=a"), Scope::Subtree, Filter::Everything).with_controls(Controls {
            domain_scope: true,
            ..Default::default()
        });
        let plan = router.plan_search(&req).unwrap();
        assert!(plan.referrals().is_empty());
        assert_eq!(targets(&plan), vec!["dc=a"]);
    }

    #[test]
    fn test_partial_replica_hidden_by_no_gc() {
        let mut t = PartitionTable::empty();
        t.insert(
            Partition::new(dn("dc=a"), Arc::new(MemoryBackend::with_root("a", dn("dc=a")))).partial(),
        )
        .unwrap();
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let req = Request::search(dn("cn=x,dc=a"), Scope::Subtree, Filter::Everything).with_controls(
            Controls {
                no_global_catalog: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            router.plan_search(&req).unwrap(),
            SearchPlan::PrimaryStore
        ));

        let req = Request::search(dn("cn=x,dc=a"), Scope::Subtree, Filter::Everything);
        assert_eq!(targets(&router.plan_search(&req).unwrap()), vec!["dc=a"]);
    }

    #[test]
    fn test_special_base_and_no_match_go_to_primary() {
        let t = table(&["dc=a"]);
        let r = replicate();
        let s = settings();
        let router = Router::new(&t, &r, &s);

        let req = Request::search(dn("@OPTIONS"), Scope::Base, Filter::Everything);
        assert!(matches!(router.plan_search(&req).unwrap(), SearchPlan::PrimaryStore));

        let req = Request::search(dn("dc=org"), Scope::Subtree, Filter::Everything);
        assert!(matches!(router.plan_search(&req).unwrap(), SearchPlan::PrimaryStore));
    }
}
