//! Partition configuration
//!
//! A JSON file naming the partitions, the special DNs to replicate and how
//! referrals are written. Unset fields take defaults; `load` validates
//! before returning.
//!
//! ```json
//! {
//!   "dns_domain": "example.com",
//!   "partitions": [
//!     { "dn": "cn=config,dc=example,dc=com" },
//!     { "dn": "dc=example,dc=com" }
//!   ],
//!   "table_path": "./partitions.json"
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::observability::{log_event, Event};

use super::errors::{ConfigError, ConfigResult};
use super::router::{ReferralSettings, DEFAULT_REFERRAL_SCHEME};
use super::table::{PartitionDescriptor, DEFAULT_BACKEND_KIND};

/// Special DNs replicated to every partition unless configured otherwise.
pub const DEFAULT_REPLICATE: &[&str] = &["@ATTRIBUTES", "@INDEXLIST", "@OPTIONS"];

fn default_dns_domain() -> String {
    "localdomain".to_string()
}

fn default_referral_scheme() -> String {
    DEFAULT_REFERRAL_SCHEME.to_string()
}

fn default_replicate() -> Vec<Dn> {
    DEFAULT_REPLICATE
        .iter()
        .filter_map(|s| Dn::parse(s).ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Domain written into referral URIs
    #[serde(default = "default_dns_domain")]
    pub dns_domain: String,

    #[serde(default = "default_referral_scheme")]
    pub referral_scheme: String,

    /// Special DNs copied from the primary store to every partition
    #[serde(default = "default_replicate")]
    pub replicate: Vec<Dn>,

    /// Partitions in match order, nested subtrees first
    #[serde(default)]
    pub partitions: Vec<PartitionDescriptor>,

    /// Where the partition table is persisted, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_path: Option<PathBuf>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            dns_domain: default_dns_domain(),
            referral_scheme: default_referral_scheme(),
            replicate: default_replicate(),
            partitions: Vec::new(),
            table_path: None,
        }
    }
}

impl PartitionConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content)?;

        log_event(
            Event::ConfigLoaded,
            &[
                ("partitions", &config.partitions.len().to_string()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(config)
    }

    /// Parse and validate JSON.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: PartitionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the config to `path`.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate against the built-in backend kinds.
    pub fn validate(&self) -> ConfigResult<()> {
        self.validate_with(&[DEFAULT_BACKEND_KIND])
    }

    /// Validate, accepting the given backend kinds.
    pub fn validate_with(&self, backend_kinds: &[&str]) -> ConfigResult<()> {
        if self.dns_domain.trim().is_empty() {
            return Err(ConfigError::invalid("dns_domain must not be empty"));
        }
        if self.referral_scheme.trim().is_empty() {
            return Err(ConfigError::invalid("referral_scheme must not be empty"));
        }

        for dn in &self.replicate {
            if !dn.is_special() {
                return Err(ConfigError::invalid(format!(
                    "replicate entry '{}' is not a special DN",
                    dn
                )));
            }
        }

        let mut seen = HashSet::new();
        for p in &self.partitions {
            if p.dn.is_null() || p.dn.is_special() {
                return Err(ConfigError::invalid(format!(
                    "partition root '{}' must be an ordinary DN",
                    p.dn
                )));
            }
            if !seen.insert(&p.dn) {
                return Err(ConfigError::invalid(format!(
                    "partition {} listed twice",
                    p.dn
                )));
            }
            if !backend_kinds.contains(&p.backend.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "partition {} uses unknown backend kind '{}'",
                    p.dn, p.backend
                )));
            }
        }

        Ok(())
    }

    pub fn referral_settings(&self) -> ReferralSettings {
        ReferralSettings {
            scheme: self.referral_scheme.clone(),
            dns_domain: self.dns_domain.clone(),
        }
    }
}
