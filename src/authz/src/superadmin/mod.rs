//! Superadmin override chain
//!
//! An ordered list of independent checks. The first one that matches marks
//! the principal as superadmin and the rest are skipped. A check that fails
//! (unknown predicate, store error, panicking closure) is logged and counts
//! as "no match" for that check only.
//!
//! Order:
//!
//! 1. principal type allow-list
//! 2. principal id allow-list
//! 3. email allow-list (case-insensitive)
//! 4. username allow-list
//! 5. named predicate on the principal
//! 6. sentinel action held by the principal
//! 7. custom predicate closure

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::types::Principal;

/// Superadmin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperadminConfig {
    /// Master switch; a disabled chain never matches
    pub enabled: bool,

    /// Principal types that are always superadmin
    pub principal_types: Vec<String>,

    /// Principal ids that are always superadmin
    pub principal_ids: Vec<String>,

    /// Emails that are always superadmin
    pub emails: Vec<String>,

    /// Usernames that are always superadmin
    pub usernames: Vec<String>,

    /// Predicate name dispatched through [`Principal::call_predicate`]
    pub predicate: Option<String>,

    /// Action slug that grants superadmin when held
    pub sentinel_action: Option<String>,
}

impl Default for SuperadminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            principal_types: Vec::new(),
            principal_ids: Vec::new(),
            emails: Vec::new(),
            usernames: Vec::new(),
            predicate: None,
            sentinel_action: None,
        }
    }
}

/// One link of the chain, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperadminCheck {
    /// Principal type is allow-listed
    PrincipalType,
    /// Principal id is allow-listed
    PrincipalId,
    /// Email is allow-listed, ignoring case
    Email,
    /// Username is allow-listed
    Username,
    /// Named predicate on the principal returned true
    Predicate,
    /// Principal holds the sentinel action
    SentinelAction,
    /// Custom closure returned true
    Custom,
}

impl SuperadminCheck {
    /// Every check in evaluation order
    pub const ALL: [SuperadminCheck; 7] = [
        Self::PrincipalType,
        Self::PrincipalId,
        Self::Email,
        Self::Username,
        Self::Predicate,
        Self::SentinelAction,
        Self::Custom,
    ];

    /// Snake-case name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrincipalType => "principal_type",
            Self::PrincipalId => "principal_id",
            Self::Email => "email",
            Self::Username => "username",
            Self::Predicate => "predicate",
            Self::SentinelAction => "sentinel_action",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SuperadminCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied final check
pub type CustomPredicate = Arc<dyn Fn(&dyn Principal) -> anyhow::Result<bool> + Send + Sync>;

/// Ordered, short-circuiting superadmin checks
#[derive(Clone)]
pub struct SuperadminChain {
    config: SuperadminConfig,
    emails: HashSet<String>,
    aggregator: Option<Aggregator>,
    custom: Option<CustomPredicate>,
}

impl SuperadminChain {
    /// Create a chain from configuration
    pub fn new(config: SuperadminConfig) -> Self {
        let emails = config.emails.iter().map(|e| e.to_lowercase()).collect();
        Self {
            config,
            emails,
            aggregator: None,
            custom: None,
        }
    }

    /// Aggregator used by the sentinel action check
    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Installs the custom predicate
    pub fn with_custom_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Principal) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(predicate));
        self
    }

    /// Chain configuration
    pub fn config(&self) -> &SuperadminConfig {
        &self.config
    }

    /// Whether any check matches
    pub async fn check(&self, principal: &dyn Principal) -> bool {
        self.first_match(principal).await.is_some()
    }

    /// The check that matched, if any
    ///
    /// Runs the same chain as [`check`](Self::check), so both always agree.
    pub async fn reason(&self, principal: &dyn Principal) -> Option<SuperadminCheck> {
        self.first_match(principal).await
    }

    async fn first_match(&self, principal: &dyn Principal) -> Option<SuperadminCheck> {
        if !self.config.enabled {
            return None;
        }

        for check in SuperadminCheck::ALL {
            match self.evaluate(check, principal).await {
                Ok(true) => {
                    debug!(
                        "Superadmin match for {} via {}",
                        principal.entity(),
                        check
                    );
                    return Some(check);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Superadmin check '{}' failed for {}: {}", check, principal.entity(), e);
                }
            }
        }
        None
    }

    async fn evaluate(&self, check: SuperadminCheck, principal: &dyn Principal) -> anyhow::Result<bool> {
        match check {
            SuperadminCheck::PrincipalType => Ok(self
                .config
                .principal_types
                .iter()
                .any(|t| t == principal.principal_type())),
            SuperadminCheck::PrincipalId => {
                let id = principal.principal_id();
                Ok(self.config.principal_ids.iter().any(|candidate| *candidate == id))
            }
            SuperadminCheck::Email => Ok(principal
                .email()
                .map(|email| self.emails.contains(&email.to_lowercase()))
                .unwrap_or(false)),
            SuperadminCheck::Username => Ok(principal
                .username()
                .map(|name| self.config.usernames.iter().any(|u| u == name))
                .unwrap_or(false)),
            SuperadminCheck::Predicate => match &self.config.predicate {
                Some(name) => guarded(|| principal.call_predicate(name)),
                None => Ok(false),
            },
            SuperadminCheck::SentinelAction => match (&self.config.sentinel_action, &self.aggregator) {
                (Some(slug), Some(aggregator)) => Ok(aggregator.has_action(&principal.entity(), slug).await?),
                (Some(_), None) => bail!("sentinel action configured but no aggregator attached"),
                (None, _) => Ok(false),
            },
            SuperadminCheck::Custom => match &self.custom {
                Some(predicate) => guarded(|| predicate(principal)),
                None => Ok(false),
            },
        }
    }
}

/// Turns a panic into an error
fn guarded<F>(f: F) -> anyhow::Result<bool>
where
    F: FnOnce() -> anyhow::Result<bool>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| Err(anyhow!("predicate panicked")))
}
