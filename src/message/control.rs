//! Request controls understood by the partition layer

use crate::dn::Dn;

/// Names the partition that should handle a request.
///
/// An upstream module that already knows the owning partition attaches
/// this so routing is skipped. A selector without a DN asks the router to
/// fill one in; the partition layer then reports the partition it chose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSelector {
    pub dn: Option<Dn>,
}

impl PartitionSelector {
    /// Selector bound to a partition root.
    pub fn bound(dn: Dn) -> Self {
        Self { dn: Some(dn) }
    }

    /// Selector asking for the routed partition to be filled in.
    pub fn unbound() -> Self {
        Self { dn: None }
    }
}

/// Search options control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Do not generate referrals for partitions below the base.
    pub domain_scope: bool,
    /// Expand the search into every partition below the base.
    pub phantom_root: bool,
}

/// Controls attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    /// Current-partition selector
    pub partition: Option<PartitionSelector>,
    /// Search options (consumed by search planning)
    pub search_options: Option<SearchOptions>,
    /// Standalone domain-scope control
    pub domain_scope: bool,
    /// Hide partial replicas from this search
    pub no_global_catalog: bool,
}

impl Controls {
    /// The partition DN named by a bound selector, if any.
    pub fn selected_partition(&self) -> Option<&Dn> {
        self.partition.as_ref().and_then(|sel| sel.dn.as_ref())
    }

    /// Whether domain scope was requested by either control.
    pub fn wants_domain_scope(&self) -> bool {
        self.domain_scope
            || self
                .search_options
                .map(|opts| opts.domain_scope)
                .unwrap_or(false)
    }

    /// Whether phantom-root expansion was requested.
    pub fn wants_phantom_root(&self) -> bool {
        self.search_options
            .map(|opts| opts.phantom_root)
            .unwrap_or(false)
    }

    /// Copy for a sub-request: the selector is dropped and the search
    /// option bits handled by the partition layer are cleared.
    pub fn for_subrequest(&self) -> Controls {
        Controls {
            partition: None,
            search_options: self.search_options.map(|_| SearchOptions::default()),
            domain_scope: self.domain_scope,
            no_global_catalog: self.no_global_catalog,
        }
    }
}
