//! Directory requests

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dn::Dn;

use super::control::{Controls, PartitionSelector};
use super::entry::Message;
use super::extended::ExtendedOp;
use super::filter::Filter;

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}

impl Scope {
    /// Whether `dn` is in scope of a search rooted at `base`.
    pub fn includes(&self, base: &Dn, dn: &Dn) -> bool {
        match self {
            Scope::Base => base == dn,
            Scope::OneLevel => dn.parent().as_ref() == Some(base),
            Scope::Subtree => base.is_base_of(dn),
        }
    }
}

/// Search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOp {
    pub base: Dn,
    pub scope: Scope,
    pub filter: Filter,
    /// Requested attributes; empty means all
    pub attrs: Vec<String>,
}

/// The operation a request carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Search(SearchOp),
    Add(Message),
    Modify(Message),
    Delete(Dn),
    Rename { old: Dn, new: Dn },
    Extended(ExtendedOp),
}

impl Operation {
    /// Operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Add(_) => "add",
            Self::Modify(_) => "modify",
            Self::Delete(_) => "delete",
            Self::Rename { .. } => "rename",
            Self::Extended(_) => "extended",
        }
    }

    /// The DN a request is addressed to; `None` for extended operations.
    pub fn target_dn(&self) -> Option<&Dn> {
        match self {
            Self::Search(s) => Some(&s.base),
            Self::Add(m) | Self::Modify(m) => Some(&m.dn),
            Self::Delete(dn) => Some(dn),
            Self::Rename { old, .. } => Some(old),
            Self::Extended(_) => None,
        }
    }

    /// Whether this operation writes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Add(_) | Self::Modify(_) | Self::Delete(_) | Self::Rename { .. }
        )
    }
}

/// A request: an operation plus its controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request ID for tracing; sub-requests inherit their parent's
    pub id: Uuid,
    pub operation: Operation,
    pub controls: Controls,
}

impl Request {
    /// Create a request with a fresh ID and no controls.
    pub fn new(operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            controls: Controls::default(),
        }
    }

    /// Search request with an empty attribute list.
    pub fn search(base: Dn, scope: Scope, filter: Filter) -> Self {
        Self::new(Operation::Search(SearchOp {
            base,
            scope,
            filter,
            attrs: Vec::new(),
        }))
    }

    pub fn add(message: Message) -> Self {
        Self::new(Operation::Add(message))
    }

    pub fn modify(message: Message) -> Self {
        Self::new(Operation::Modify(message))
    }

    pub fn delete(dn: Dn) -> Self {
        Self::new(Operation::Delete(dn))
    }

    pub fn rename(old: Dn, new: Dn) -> Self {
        Self::new(Operation::Rename { old, new })
    }

    pub fn extended(op: ExtendedOp) -> Self {
        Self::new(Operation::Extended(op))
    }

    /// A request issued on behalf of this one: same ID, no controls.
    pub fn child(&self, operation: Operation) -> Self {
        Self {
            id: self.id,
            operation,
            controls: Controls::default(),
        }
    }

    /// Builder: replace the controls.
    pub fn with_controls(mut self, controls: Controls) -> Self {
        self.controls = controls;
        self
    }

    /// Builder: attach a partition selector.
    pub fn with_selector(mut self, selector: PartitionSelector) -> Self {
        self.controls.partition = Some(selector);
        self
    }

    /// Search parameters, if this is a search.
    pub fn as_search(&self) -> Option<&SearchOp> {
        match &self.operation {
            Operation::Search(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_scope_includes() {
        let base = dn("dc=example,dc=com");
        let child = dn("cn=users,dc=example,dc=com");
        let grandchild = dn("cn=alice,cn=users,dc=example,dc=com");

        assert!(Scope::Base.includes(&base, &base));
        assert!(!Scope::Base.includes(&base, &child));
        assert!(Scope::OneLevel.includes(&base, &child));
        assert!(!Scope::OneLevel.includes(&base, &grandchild));
        assert!(!Scope::OneLevel.includes(&base, &base));
        assert!(Scope::Subtree.includes(&base, &grandchild));
    }

    #[test]
    fn test_target_dn() {
        let req = Request::rename(dn("cn=a,dc=com"), dn("cn=b,dc=com"));
        assert_eq!(req.operation.target_dn(), Some(&dn("cn=a,dc=com")));
        assert!(req.operation.is_write());

        let ext = Request::extended(ExtendedOp::StartTls);
        assert!(ext.operation.target_dn().is_none());
        assert_eq!(ext.operation.name(), "extended");
    }

    #[test]
    fn test_child_keeps_id_drops_controls() {
        let parent = Request::delete(dn("cn=a,dc=com"))
            .with_selector(PartitionSelector::bound(dn("dc=com")));
        let child = parent.child(Operation::Delete(dn("cn=b,dc=com")));
        assert_eq!(child.id, parent.id);
        assert!(child.controls.partition.is_none());
    }
}
