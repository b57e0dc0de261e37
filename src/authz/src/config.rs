//! Engine configuration
//!
//! Loaded from JSON; every section is optional and falls back to defaults.
//!
//! ```json
//! {
//!   "actions": { "users": { "view": "View users", "create": "" } },
//!   "definitions": {
//!     "roles": { "viewer": { "actions": ["users.view"] } },
//!     "groups": { "staff": { "roles": ["viewer"] } }
//!   },
//!   "allocation": { "strategy": "append_only" },
//!   "sparse": { "mode": "auto", "exit_savings_percent": 30.0 },
//!   "cache": { "ttl_secs": 30 },
//!   "superadmin": { "emails": ["root@example.com"] }
//! }
//! ```
//!
//! Environment overrides (applied by [`EngineConfig::with_env_overrides`]):
//!
//! | Variable | Field |
//! |---|---|
//! | `PERMASK_CACHE_TTL` | `cache.ttl_secs` |
//! | `PERMASK_CACHE_ENABLED` | `cache.enabled` |
//! | `PERMASK_SPARSE_MODE` | `sparse.mode` |
//! | `PERMASK_SUPERADMIN_ENABLED` | `superadmin.enabled` |

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::allocator::{ActionConfig, AllocationStrategy};
use crate::cache::CacheConfig;
use crate::error::{AuthzError, Result};
use crate::sparse::{SparseConfig, StorageMode};
use crate::superadmin::SuperadminConfig;

/// Bit allocation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// How positions are assigned on rebuild
    pub strategy: AllocationStrategy,
}

/// Actions directly granted to a role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDefinition {
    /// Action slugs
    pub actions: Vec<String>,
}

/// Roles and actions granted to a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDefinition {
    /// Role slugs
    pub roles: Vec<String>,

    /// Action slugs
    pub actions: Vec<String>,
}

/// Role and group definitions, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Definitions {
    /// Roles by slug
    pub roles: IndexMap<String, RoleDefinition>,

    /// Groups by slug
    pub groups: IndexMap<String, GroupDefinition>,
}

impl Definitions {
    /// Checks that groups only reference declared roles
    pub fn validate(&self) -> Result<()> {
        for (group, definition) in &self.groups {
            if let Some(role) = definition.roles.iter().find(|r| !self.roles.contains_key(*r)) {
                return Err(AuthzError::Configuration(format!(
                    "Group '{}' references undefined role '{}'",
                    group, role
                )));
            }
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ordered action tree
    pub actions: ActionConfig,

    /// Role and group definitions
    pub definitions: Definitions,

    /// Bit allocation
    pub allocation: AllocationConfig,

    /// Sparse storage thresholds
    pub sparse: SparseConfig,

    /// Permission cache
    pub cache: CacheConfig,

    /// Superadmin chain
    pub superadmin: SuperadminConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuthzError::Configuration(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        info!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Applies `PERMASK_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = parsed(&lookup, "PERMASK_CACHE_TTL", |v| v.parse::<u64>().ok()) {
            self.cache.ttl_secs = ttl;
        }
        if let Some(enabled) = parsed(&lookup, "PERMASK_CACHE_ENABLED", parse_bool) {
            self.cache.enabled = enabled;
        }
        if let Some(mode) = parsed(&lookup, "PERMASK_SPARSE_MODE", |v| v.parse::<StorageMode>().ok()) {
            self.sparse.mode = mode;
        }
        if let Some(enabled) = parsed(&lookup, "PERMASK_SUPERADMIN_ENABLED", parse_bool) {
            self.superadmin.enabled = enabled;
        }
        self
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.actions.validate()?;
        self.definitions.validate()?;

        let sparse = &self.sparse;
        if !(0.0..=100.0).contains(&sparse.min_savings_percent) {
            return Err(AuthzError::Configuration(
                "sparse.min_savings_percent must be between 0 and 100".to_string(),
            ));
        }
        if let Some(exit) = sparse.exit_savings_percent {
            if exit > sparse.min_savings_percent {
                return Err(AuthzError::Configuration(
                    "sparse.exit_savings_percent must not exceed min_savings_percent".to_string(),
                ));
            }
        }
        if sparse.per_entry_overhead == 0 {
            return Err(AuthzError::Configuration(
                "sparse.per_entry_overhead must be positive".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(AuthzError::Configuration(
                "cache.capacity must be positive when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn parsed<T, F, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    let value = parse(raw.trim());
    if value.is_none() {
        warn!("Ignoring invalid value '{}' for {}", raw, key);
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
