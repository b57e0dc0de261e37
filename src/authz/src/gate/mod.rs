//! Ability gate
//!
//! Every ability check passes through the superadmin chain first; a
//! superadmin is authorized regardless of the ability's own rule. Abilities
//! without a registered rule are treated as action slugs and answered by
//! the aggregator.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::error::Result;
use crate::superadmin::{SuperadminChain, SuperadminCheck};
use crate::types::Principal;

/// Rule attached to a named ability
pub type AbilityRule = Arc<dyn Fn(&dyn Principal) -> anyhow::Result<bool> + Send + Sync>;

/// Why an ability was allowed or denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GateReason {
    /// Superadmin bypass
    Superadmin { check: SuperadminCheck },

    /// Registered ability rule
    Rule,

    /// Ability resolved as an action slug
    Action,

    /// Rule failed; counted as a denial
    EvaluationError { error: String },
}

/// Outcome of an ability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Ability that was checked
    pub ability: String,

    /// Whether it was allowed
    pub allowed: bool,

    /// How the decision was reached
    pub reason: GateReason,
}

/// Superadmin-first ability checks
#[derive(Clone)]
pub struct AbilityGate {
    chain: SuperadminChain,
    aggregator: Aggregator,
    rules: Arc<DashMap<String, AbilityRule>>,
}

impl AbilityGate {
    /// Create a gate in front of an aggregator
    pub fn new(chain: SuperadminChain, aggregator: Aggregator) -> Self {
        Self {
            chain,
            aggregator,
            rules: Arc::new(DashMap::new()),
        }
    }

    /// Registers (or replaces) the rule of an ability
    pub fn define<F>(&self, ability: impl Into<String>, rule: F)
    where
        F: Fn(&dyn Principal) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let ability = ability.into();
        debug!("Defined ability '{}'", ability);
        self.rules.insert(ability, Arc::new(rule));
    }

    /// Whether an ability has a registered rule
    pub fn has_rule(&self, ability: &str) -> bool {
        self.rules.contains_key(ability)
    }

    /// Superadmin chain used as pre-filter
    pub fn chain(&self) -> &SuperadminChain {
        &self.chain
    }

    /// Full decision for one ability
    pub async fn inspect(&self, principal: &dyn Principal, ability: &str) -> Result<GateDecision> {
        if let Some(check) = self.chain.reason(principal).await {
            return Ok(GateDecision {
                ability: ability.to_string(),
                allowed: true,
                reason: GateReason::Superadmin { check },
            });
        }

        // no shard lock held while the rule runs
        let rule = self.rules.get(ability).map(|entry| Arc::clone(entry.value()));

        let (allowed, reason) = match rule {
            Some(rule) => match rule(principal) {
                Ok(allowed) => (allowed, GateReason::Rule),
                Err(e) => {
                    warn!("Ability '{}' rule failed for {}: {}", ability, principal.entity(), e);
                    (false, GateReason::EvaluationError { error: e.to_string() })
                }
            },
            None => (
                self.aggregator.has_action(&principal.entity(), ability).await?,
                GateReason::Action,
            ),
        };

        debug!("Ability '{}' for {}: {}", ability, principal.entity(), allowed);
        Ok(GateDecision {
            ability: ability.to_string(),
            allowed,
            reason,
        })
    }

    /// Whether the ability is allowed
    pub async fn allows(&self, principal: &dyn Principal, ability: &str) -> Result<bool> {
        Ok(self.inspect(principal, ability).await?.allowed)
    }

    /// Whether the ability is denied
    pub async fn denies(&self, principal: &dyn Principal, ability: &str) -> Result<bool> {
        Ok(!self.allows(principal, ability).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{ActionConfig, AllocationStrategy, BitAllocator};
    use crate::sparse::{BitmaskRepository, SparseOptimizer};
    use crate::store::{InMemoryPermissionStore, PermissionStore};
    use crate::superadmin::SuperadminConfig;
    use crate::types::EntityRef;
    use tokio::sync::RwLock;

    struct Service(&'static str);

    impl Principal for Service {
        fn principal_type(&self) -> &str {
            "service"
        }

        fn principal_id(&self) -> String {
            self.0.to_string()
        }
    }

    async fn gate(config: SuperadminConfig) -> AbilityGate {
        let store: Arc<dyn PermissionStore> = Arc::new(InMemoryPermissionStore::new());
        let allocator = BitAllocator::new(
            ActionConfig::new().with_category("reports", ["view"]),
            AllocationStrategy::ConfigOrder,
        );
        let bitmasks = BitmaskRepository::new(store.clone(), SparseOptimizer::default());
        store.upsert_action("reports.view", Some(0), None).await.unwrap();
        bitmasks
            .set_bitmask(&EntityRef::action("reports.view"), &crate::bitmask::Bitmask::from_bit(0))
            .await
            .unwrap();

        let aggregator = Aggregator::new(store, bitmasks, Arc::new(RwLock::new(allocator)), None);
        AbilityGate::new(SuperadminChain::new(config), aggregator)
    }

    #[tokio::test]
    async fn test_superadmin_overrides_false_rule() {
        let gate = gate(SuperadminConfig {
            principal_ids: vec!["ops".to_string()],
            ..Default::default()
        })
        .await;
        gate.define("never", |_| Ok(false));

        let decision = gate.inspect(&Service("ops"), "never").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(
            decision.reason,
            GateReason::Superadmin {
                check: SuperadminCheck::PrincipalId
            }
        );
        assert!(gate.denies(&Service("batch"), "never").await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_ability_uses_action() {
        let gate = gate(SuperadminConfig::default()).await;
        assert!(!gate.allows(&Service("batch"), "reports.view").await.unwrap());

        gate.aggregator
            .assign_action(&EntityRef::new("service", "batch"), "reports.view")
            .await
            .unwrap();
        let decision = gate.inspect(&Service("batch"), "reports.view").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, GateReason::Action);
    }

    #[tokio::test]
    async fn test_failing_rule_denies() {
        let gate = gate(SuperadminConfig::default()).await;
        gate.define("flaky", |_| Err(anyhow::anyhow!("backend down")));

        let decision = gate.inspect(&Service("batch"), "flaky").await.unwrap();
        assert!(!decision.allowed);
        assert!(matches!(decision.reason, GateReason::EvaluationError { .. }));
    }
}
