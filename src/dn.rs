//! Distinguished Names
//!
//! A deliberately small DN model: enough to route requests by subtree.
//!
//! - The empty string is the null DN (the namespace root).
//! - A string beginning with `@` is a special DN. Special DNs are opaque
//!   and only ever compared for equality, case-sensitively.
//! - Everything else is a comma-separated list of `attr=value` components,
//!   leaf first. Comparison ignores case and surrounding whitespace.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DirResult, DirectoryError};

/// One relative component of a DN, as written.
#[derive(Debug, Clone)]
struct Rdn {
    attr: String,
    value: String,
}

/// A parsed distinguished name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    /// Components, leaf first. Empty for null and special DNs.
    components: Vec<Rdn>,
    /// Set for `@...` DNs.
    special: Option<String>,
    /// Case-folded form used for equality and hashing.
    folded: Vec<String>,
}

impl Dn {
    /// Parse a DN string.
    pub fn parse(input: &str) -> DirResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::null());
        }

        if trimmed.starts_with('@') {
            return Ok(Self {
                components: Vec::new(),
                special: Some(trimmed.to_string()),
                folded: Vec::new(),
            });
        }

        let mut components = Vec::new();
        for raw in split_unescaped(trimmed, ',') {
            let raw = raw.trim();
            let mut parts = split_unescaped(raw, '=');
            if parts.len() < 2 {
                return Err(DirectoryError::invalid_dn(format!(
                    "component '{}' of '{}' has no '='",
                    raw, input
                )));
            }
            let attr = parts.remove(0).trim().to_string();
            let value = parts.join("=").trim().to_string();
            if attr.is_empty() || value.is_empty() {
                return Err(DirectoryError::invalid_dn(format!(
                    "empty attribute or value in '{}'",
                    input
                )));
            }
            components.push(Rdn { attr, value });
        }

        let folded = components
            .iter()
            .map(|rdn| format!("{}={}", rdn.attr.to_lowercase(), rdn.value.to_lowercase()))
            .collect();

        Ok(Self {
            components,
            special: None,
            folded,
        })
    }

    /// The null DN.
    pub fn null() -> Self {
        Self {
            components: Vec::new(),
            special: None,
            folded: Vec::new(),
        }
    }

    /// True for the null (root) DN.
    pub fn is_null(&self) -> bool {
        self.special.is_none() && self.components.is_empty()
    }

    /// True for `@...` DNs.
    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }

    /// Number of components.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The parent DN, if any.
    pub fn parent(&self) -> Option<Dn> {
        if self.special.is_some() || self.components.is_empty() {
            return None;
        }
        Some(Self {
            components: self.components[1..].to_vec(),
            special: None,
            folded: self.folded[1..].to_vec(),
        })
    }

    /// A child of this DN with one more leaf component.
    pub fn child(&self, attr: &str, value: &str) -> DirResult<Dn> {
        if self.is_special() {
            return Err(DirectoryError::invalid_dn(format!(
                "special DN '{}' cannot have children",
                self
            )));
        }
        if self.is_null() {
            return Dn::parse(&format!("{}={}", attr, value));
        }
        Dn::parse(&format!("{}={},{}", attr, value, self.linearized()))
    }

    /// Ancestor-or-equal test: true if `other` is this DN or lies below it.
    ///
    /// Special DNs only match themselves. The null DN is the base of every
    /// non-special DN.
    pub fn is_base_of(&self, other: &Dn) -> bool {
        if self.is_special() || other.is_special() {
            return self == other;
        }
        if self.folded.len() > other.folded.len() {
            return false;
        }
        let offset = other.folded.len() - self.folded.len();
        other.folded[offset..] == self.folded[..]
    }

    /// Strict ancestor test.
    pub fn is_ancestor_of(&self, other: &Dn) -> bool {
        self.is_base_of(other) && self != other
    }

    /// The normalised string form.
    pub fn linearized(&self) -> String {
        if let Some(special) = &self.special {
            return special.clone();
        }
        self.components
            .iter()
            .map(|rdn| format!("{}={}", rdn.attr, rdn.value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Split on `sep`, ignoring separators preceded by a backslash.
fn split_unescaped(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        if c == '\\' {
            current.push(c);
            escaped = true;
            continue;
        }
        if c == sep {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }
    parts.push(current);
    parts
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        match (&self.special, &other.special) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.folded == other.folded,
            _ => false,
        }
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.special.hash(state);
        self.folded.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.linearized())
    }
}

impl FromStr for Dn {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Dn::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.linearized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_null_and_special() {
        assert!(dn("").is_null());
        assert!(dn("@ATTRIBUTES").is_special());
        assert!(!dn("@ATTRIBUTES").is_null());
        assert_ne!(dn("@ATTRIBUTES"), dn("@attributes"));
    }

    #[test]
    fn test_case_insensitive_equality() {
        assert_eq!(dn("DC=Example,DC=Com"), dn("dc=example, dc=com"));
    }

    #[test]
    fn test_is_base_of() {
        let base = dn("dc=example,dc=com");
        assert!(base.is_base_of(&dn("dc=example,dc=com")));
        assert!(base.is_base_of(&dn("cn=users,dc=example,dc=com")));
        assert!(!base.is_base_of(&dn("dc=com")));
        assert!(!base.is_base_of(&dn("dc=other,dc=com")));
        assert!(Dn::null().is_base_of(&base));
        assert!(!base.is_base_of(&dn("@OPTIONS")));
    }

    #[test]
    fn test_strict_ancestor() {
        let base = dn("dc=com");
        assert!(base.is_ancestor_of(&dn("dc=example,dc=com")));
        assert!(!base.is_ancestor_of(&dn("dc=com")));
    }

    #[test]
    fn test_escaped_comma() {
        let parsed = dn("cn=Smith\\, John,dc=com");
        assert_eq!(parsed.depth(), 2);
        assert_eq!(parsed.parent().unwrap(), dn("dc=com"));
    }

    #[test]
    fn test_invalid_component() {
        let err = Dn::parse("cn=ok,broken").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidDn);
    }

    #[test]
    fn test_child_and_linearized() {
        let child = dn("dc=com").child("dc", "example").unwrap();
        assert_eq!(child.linearized(), "dc=example,dc=com");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&dn("cn=a,dc=b")).unwrap();
        assert_eq!(json, "\"cn=a,dc=b\"");
        let back: Dn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dn("cn=a,dc=b"));
    }
}
