//! Directory entries and modification lists

use serde::{Deserialize, Serialize};

use crate::dn::Dn;

/// Modification type carried on an element.
///
/// Add requests carry `None`; modify requests carry one of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModFlag {
    #[default]
    None,
    Add,
    Replace,
    Delete,
}

/// One attribute with its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default)]
    pub flag: ModFlag,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Element {
    /// Create an element without a modification flag.
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            flag: ModFlag::None,
            values,
        }
    }

    /// Create an element with a modification flag.
    pub fn with_flag(name: impl Into<String>, flag: ModFlag, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            flag,
            values,
        }
    }

    /// Attribute names compare case-insensitively.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// A delete, or a replace with no values: both remove the attribute.
    pub fn removes_attribute(&self) -> bool {
        self.flag == ModFlag::Delete || (self.flag == ModFlag::Replace && self.values.is_empty())
    }
}

/// An entry, or a modification list against an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub dn: Dn,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Message {
    /// Create an empty message for `dn`.
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            elements: Vec::new(),
        }
    }

    /// Builder: append an attribute with values.
    pub fn with_attr(mut self, name: &str, values: &[&str]) -> Self {
        self.elements.push(Element::new(
            name,
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    /// Builder: append a flagged modification.
    pub fn with_mod(mut self, flag: ModFlag, name: &str, values: &[&str]) -> Self {
        self.elements.push(Element::with_flag(
            name,
            flag,
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    /// Find an element by attribute name.
    pub fn find_element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|el| el.is_named(name))
    }

    /// Find an element by attribute name, mutably.
    pub fn find_element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|el| el.is_named(name))
    }

    /// Values of an attribute, empty if absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.find_element(name)
            .map(|el| el.values.as_slice())
            .unwrap_or(&[])
    }

    /// Append an element with no values.
    pub fn add_empty(&mut self, name: &str, flag: ModFlag) {
        self.elements.push(Element::with_flag(name, flag, Vec::new()));
    }

    /// Remove every element with this name.
    pub fn remove_element(&mut self, name: &str) {
        self.elements.retain(|el| !el.is_named(name));
    }

    /// Set every element's flag.
    pub fn mark_all(&mut self, flag: ModFlag) {
        for el in &mut self.elements {
            el.flag = flag;
        }
    }
}
