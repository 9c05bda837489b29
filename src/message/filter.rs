//! Search filters
//!
//! Only what the in-memory stores need: presence, equality, and/or.
//! Backends with a real filter engine receive the filter untouched.

use serde::{Deserialize, Serialize};

use crate::error::{DirResult, DirectoryError};

use super::entry::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Everything,
    Present(String),
    Equality(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Parse `(attr=value)`, `(attr=*)`, `(&...)` and `(|...)`.
    /// An empty string matches everything.
    pub fn parse(input: &str) -> DirResult<Filter> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Filter::Everything);
        }
        let (filter, rest) = parse_one(input)?;
        if !rest.trim().is_empty() {
            return Err(DirectoryError::operations(format!(
                "trailing input in filter '{}'",
                input
            )));
        }
        Ok(filter)
    }

    /// Evaluate against an entry.
    pub fn matches(&self, msg: &Message) -> bool {
        match self {
            Filter::Everything => true,
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || msg.find_element(attr).is_some()
            }
            Filter::Equality(attr, value) => msg
                .values(attr)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::And(parts) => parts.iter().all(|f| f.matches(msg)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(msg)),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Everything
    }
}

fn parse_one(input: &str) -> DirResult<(Filter, &str)> {
    let input = input.trim_start();
    let body = input
        .strip_prefix('(')
        .ok_or_else(|| DirectoryError::operations(format!("filter must start with '(': {}", input)))?;

    if let Some(rest) = body.strip_prefix('&') {
        let (parts, rest) = parse_list(rest)?;
        return Ok((Filter::And(parts), rest));
    }
    if let Some(rest) = body.strip_prefix('|') {
        let (parts, rest) = parse_list(rest)?;
        return Ok((Filter::Or(parts), rest));
    }

    let close = body
        .find(')')
        .ok_or_else(|| DirectoryError::operations("unterminated filter"))?;
    let item = &body[..close];
    let rest = &body[close + 1..];
    let (attr, value) = item
        .split_once('=')
        .ok_or_else(|| DirectoryError::operations(format!("filter item without '=': {}", item)))?;
    let attr = attr.trim().to_string();
    let value = value.trim();
    if value == "*" {
        Ok((Filter::Present(attr), rest))
    } else {
        Ok((Filter::Equality(attr, value.to_string()), rest))
    }
}

fn parse_list(mut input: &str) -> DirResult<(Vec<Filter>, &str)> {
    let mut parts = Vec::new();
    loop {
        let trimmed = input.trim_start();
        if let Some(rest) = trimmed.strip_prefix(')') {
            return Ok((parts, rest));
        }
        if trimmed.is_empty() {
            return Err(DirectoryError::operations("unterminated filter list"));
        }
        let (filter, rest) = parse_one(trimmed)?;
        parts.push(filter);
        input = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Message {
        Message::new(Dn::parse("cn=alice,dc=com").unwrap())
            .with_attr("cn", &["alice"])
            .with_attr("mail", &["alice@example.com"])
    }

    #[test]
    fn test_parse_and_match() {
        assert!(Filter::parse("").unwrap().matches(&entry()));
        assert!(Filter::parse("(cn=ALICE)").unwrap().matches(&entry()));
        assert!(Filter::parse("(mail=*)").unwrap().matches(&entry()));
        assert!(!Filter::parse("(sn=*)").unwrap().matches(&entry()));
        assert!(Filter::parse("(&(cn=alice)(mail=*))").unwrap().matches(&entry()));
        assert!(Filter::parse("(|(cn=bob)(cn=alice))").unwrap().matches(&entry()));
        assert!(!Filter::parse("(&(cn=bob)(mail=*))").unwrap().matches(&entry()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("cn=alice").is_err());
        assert!(Filter::parse("(cn=alice").is_err());
        assert!(Filter::parse("(&(cn=a)").is_err());
    }
}
