//! Permission engine
//!
//! Wires allocator, bitmask repository, aggregator, cache, resource resolver
//! and superadmin gate together and exposes the operations callers use.
//!
//! # Architecture
//!
//! ```text
//! ActionConfig → BitAllocator → Action bitmasks ─┐
//!                                                ↓
//! Principal → [Superadmin] → Aggregator (OR of actions | roles | groups) → bit test
//!                               ↓                         ↓
//!                            [Cache]            BitmaskRepository (dense | sparse)
//!
//! Principal → ResourceResolver (instance | category | wildcard slug)
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, RebuildSummary};
use crate::allocator::{ActionConfig, AllocationStrategy, AllocationTable, BitAllocator, PositionDrift};
use crate::bitmask::{BitPosition, Bitmask};
use crate::cache::{CacheStats, PermissionCache};
use crate::config::{Definitions, EngineConfig};
use crate::error::Result;
use crate::gate::{AbilityGate, GateDecision};
use crate::resource::{ResourceRegistry, ResourceResolver, ResourceSlug};
use crate::sparse::{BitmaskRepository, SparseOptimizer, StoredBitmask};
use crate::store::PermissionStore;
use crate::superadmin::{SuperadminChain, SuperadminCheck};
use crate::types::{EntityRef, Principal, ACTION_TYPE, ROLE_TYPE};

/// Outcome of [`PermissionEngine::rebuild_allocation`]
#[derive(Debug, Clone)]
pub struct AllocationReport {
    /// The new table
    pub table: AllocationTable,

    /// Persisted positions that disagreed with the new table
    pub drift: Vec<PositionDrift>,

    /// Previously allocated actions that are now relational-only
    pub demoted: Vec<String>,

    /// Role and group masks recomputed afterwards
    pub rebuilt: RebuildSummary,
}

/// Main permission engine
pub struct PermissionEngine {
    /// Engine configuration
    config: EngineConfig,

    /// Relational storage backend
    store: Arc<dyn PermissionStore>,

    /// Slug -> bit table, replaced only by `rebuild_allocation`
    allocator: Arc<RwLock<BitAllocator>>,

    /// Representation-transparent bitmask access
    bitmasks: BitmaskRepository,

    /// Aggregate and check cache
    cache: Option<Arc<PermissionCache>>,

    aggregator: Aggregator,
    resources: ResourceResolver,
    gate: AbilityGate,
}

impl PermissionEngine {
    /// Create a new engine
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `store` - Storage backend
    /// * `registry` - Resource types that may carry grants
    ///
    /// # Returns
    ///
    /// An engine whose allocation table is built from `config.actions`. With
    /// the append-only strategy, positions already persisted in `store` seed
    /// the table so they survive restarts, and retired positions stay
    /// reserved.
    pub async fn new(
        config: EngineConfig,
        store: Arc<dyn PermissionStore>,
        registry: ResourceRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let allocator = match config.allocation.strategy {
            AllocationStrategy::ConfigOrder => {
                BitAllocator::new(config.actions.clone(), AllocationStrategy::ConfigOrder)
            }
            AllocationStrategy::AppendOnly => {
                let (persisted, retired) = persisted_positions(store.as_ref()).await?;
                let seed = AllocationTable::from_persisted(persisted, retired);
                let mut allocator =
                    BitAllocator::with_table(config.actions.clone(), AllocationStrategy::AppendOnly, seed);
                allocator.rebuild();
                allocator
            }
        };
        let allocator = Arc::new(RwLock::new(allocator));

        let bitmasks = BitmaskRepository::new(store.clone(), SparseOptimizer::new(config.sparse.clone()));

        let cache = if config.cache.enabled {
            Some(Arc::new(PermissionCache::new(config.cache.clone())))
        } else {
            None
        };

        let aggregator = Aggregator::new(store.clone(), bitmasks.clone(), allocator.clone(), cache.clone());
        let resources = ResourceResolver::new(store.clone(), aggregator.clone(), Arc::new(registry));
        let chain = SuperadminChain::new(config.superadmin.clone()).with_aggregator(aggregator.clone());
        let gate = AbilityGate::new(chain, aggregator.clone());

        info!(
            "PermissionEngine initialized with cache={}, sparse={:?}, allocation={:?}",
            config.cache.enabled, config.sparse.mode, config.allocation.strategy
        );

        Ok(Self {
            config,
            store,
            allocator,
            bitmasks,
            cache,
            aggregator,
            resources,
            gate,
        })
    }

    /// Installs the custom superadmin predicate
    ///
    /// Replaces the gate, so call it before defining abilities.
    pub fn with_superadmin_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Principal) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let chain = self.gate.chain().clone().with_custom_predicate(predicate);
        self.gate = AbilityGate::new(chain, self.aggregator.clone());
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Storage backend
    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    /// Aggregator, for role and group assignment
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Resource grant resolver
    pub fn resources(&self) -> &ResourceResolver {
        &self.resources
    }

    /// Ability gate
    pub fn gate(&self) -> &AbilityGate {
        &self.gate
    }

    /// Bitmask repository
    pub fn bitmasks(&self) -> &BitmaskRepository {
        &self.bitmasks
    }

    /// Snapshot of the current allocation table
    pub async fn allocation_table(&self) -> AllocationTable {
        self.allocator.read().await.table().clone()
    }

    /// Reallocates bit positions from an action config
    ///
    /// # Pipeline
    ///
    /// 1. Rebuild the table (config order or append-only)
    /// 2. Report drift between persisted positions and the new table
    /// 3. Persist position and bitmask of every allocated action
    /// 4. Demote previously allocated actions missing from the table
    /// 5. Clear the cache and rebuild every role and group
    pub async fn rebuild_allocation(&self, actions: ActionConfig) -> Result<AllocationReport> {
        let persisted: HashMap<String, BitPosition> =
            persisted_positions(self.store.as_ref()).await?.0.into_iter().collect();

        let table = {
            let mut allocator = self.allocator.write().await;
            allocator.replace_config(actions);
            allocator.rebuild().clone()
        };

        let drift = table.detect_drift(&persisted);
        if !drift.is_empty() {
            warn!(
                "{} persisted action positions changed; role and group masks will be rebuilt",
                drift.len()
            );
        }

        for action in table.actions() {
            self.store
                .upsert_action(&action.slug, Some(action.bit_position), action.description.clone())
                .await?;
            self.bitmasks
                .set_bitmask(&EntityRef::action(&action.slug), &action.bitmask())
                .await?;
        }

        let mut retiring: Vec<(&String, BitPosition)> = persisted
            .iter()
            .filter(|(slug, _)| table.position_of(slug).is_none())
            .map(|(slug, position)| (slug, *position))
            .collect();
        retiring.sort();
        let mut demoted = Vec::with_capacity(retiring.len());
        for (slug, position) in retiring {
            self.store.retire_action(slug, position).await?;
            self.bitmasks
                .set_bitmask(&EntityRef::action(slug), &Bitmask::zero())
                .await?;
            debug!("Demoted '{}' to relational-only, bit {} retired", slug, position);
            demoted.push(slug.clone());
        }

        self.invalidate_cache();
        let rebuilt = self.aggregator.rebuild_all().await?;

        info!(
            "Allocation rebuilt: {} actions, {} drifted, {} demoted",
            table.len(),
            drift.len(),
            demoted.len()
        );

        Ok(AllocationReport {
            table,
            drift,
            demoted,
            rebuilt,
        })
    }

    /// Reallocates from a JSON action tree; a malformed tree allocates nothing
    pub async fn rebuild_allocation_from_json(&self, json: &str) -> Result<AllocationReport> {
        self.rebuild_allocation(ActionConfig::from_json_str_lenient(json)).await
    }

    /// Makes stored roles and groups match their definitions, then rebuilds
    ///
    /// Roles and groups not mentioned are left alone. Every referenced
    /// action must already exist.
    pub async fn sync_definitions(&self, definitions: &Definitions) -> Result<RebuildSummary> {
        definitions.validate()?;

        for (slug, definition) in &definitions.roles {
            self.store.upsert_role(slug).await?;
            self.sync_edges(&EntityRef::role(slug.as_str()), ACTION_TYPE, &definition.actions)
                .await?;
        }

        for (slug, definition) in &definitions.groups {
            self.store.upsert_group(slug).await?;
            let group = EntityRef::group(slug.as_str());
            self.sync_edges(&group, ACTION_TYPE, &definition.actions).await?;
            self.sync_edges(&group, ROLE_TYPE, &definition.roles).await?;
        }

        info!(
            "Synced {} roles and {} groups",
            definitions.roles.len(),
            definitions.groups.len()
        );
        self.aggregator.rebuild_all().await
    }

    async fn sync_edges(&self, holder: &EntityRef, target_type: &str, wanted: &[String]) -> Result<()> {
        let wanted: BTreeSet<&str> = wanted.iter().map(String::as_str).collect();
        let current: Vec<String> = self.store.attached(holder, target_type).await?;
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

        for slug in current.iter().filter(|s| !wanted.contains(s.as_str())) {
            match target_type {
                ACTION_TYPE => self.aggregator.revoke_action(holder, slug).await?,
                _ => self.aggregator.revoke_role(holder, slug).await?,
            };
        }

        for slug in wanted.iter().filter(|s| !current_set.contains(*s)) {
            match target_type {
                ACTION_TYPE => self.aggregator.assign_action(holder, slug).await?,
                _ => self.aggregator.assign_role(holder, slug).await?,
            };
        }
        Ok(())
    }

    /// Effective bitmask of a principal as a decimal string
    pub async fn aggregate(&self, principal: &dyn Principal) -> Result<String> {
        Ok(self
            .aggregator
            .effective_bitmask(&principal.entity())
            .await?
            .to_decimal_string())
    }

    /// Whether the principal holds an action
    pub async fn has_action(&self, principal: &dyn Principal, slug: &str) -> Result<bool> {
        self.aggregator.has_action(&principal.entity(), slug).await
    }

    /// Whether the principal holds any of the actions
    pub async fn has_any_action<S: AsRef<str>>(&self, principal: &dyn Principal, slugs: &[S]) -> Result<bool> {
        self.aggregator.has_any_action(&principal.entity(), slugs).await
    }

    /// Whether the principal holds all of the actions
    pub async fn has_all_actions<S: AsRef<str>>(&self, principal: &dyn Principal, slugs: &[S]) -> Result<bool> {
        self.aggregator.has_all_actions(&principal.entity(), slugs).await
    }

    /// Grants a resource slug (`posts.edit.42`, `posts.edit`, `posts.*`)
    pub async fn grant(&self, principal: &dyn Principal, slug: &str) -> Result<bool> {
        let slug = ResourceSlug::parse(slug)?;
        self.resources.grant(&principal.entity(), &slug).await
    }

    /// Revokes a resource slug
    pub async fn revoke(&self, principal: &dyn Principal, slug: &str) -> Result<bool> {
        let slug = ResourceSlug::parse(slug)?;
        self.resources.revoke(&principal.entity(), &slug).await
    }

    /// Whether the principal may perform `action` on one resource instance
    ///
    /// A superadmin may act on every instance of every type.
    pub async fn user_can(&self, principal: &dyn Principal, key: &str, action: &str, id: &str) -> Result<bool> {
        if let Some(check) = self.gate.chain().reason(principal).await {
            debug!("user_can({}.{}.{}) granted by superadmin check {}", key, action, id, check);
            return Ok(true);
        }
        self.resources.user_can(&principal.entity(), key, action, id).await
    }

    /// Whether any superadmin check matches
    pub async fn is_super_admin(&self, principal: &dyn Principal) -> bool {
        self.gate.chain().check(principal).await
    }

    /// The superadmin check that matched, if any
    pub async fn super_admin_reason(&self, principal: &dyn Principal) -> Option<SuperadminCheck> {
        self.gate.chain().reason(principal).await
    }

    /// Ability check behind the superadmin pre-filter
    pub async fn can(&self, principal: &dyn Principal, ability: &str) -> Result<bool> {
        self.gate.allows(principal, ability).await
    }

    /// Ability check with its reason
    pub async fn inspect(&self, principal: &dyn Principal, ability: &str) -> Result<GateDecision> {
        self.gate.inspect(principal, ability).await
    }

    /// Physical form the configured thresholds pick for a decimal value
    pub fn optimize(&self, value: &str) -> Result<StoredBitmask> {
        let value = Bitmask::parse(value)?;
        Ok(self.bitmasks.optimizer().optimize(&value))
    }

    /// Decimal value of a physical form
    pub fn restore(&self, stored: &StoredBitmask) -> String {
        self.bitmasks.optimizer().restore(stored).to_decimal_string()
    }

    /// Drops every cached aggregate and check
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("Permission cache invalidated");
        }
    }

    /// Cache statistics, when caching is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }
}

/// Allocated and retired `(slug, position)` pairs from the store
async fn persisted_positions(
    store: &dyn PermissionStore,
) -> Result<(Vec<(String, BitPosition)>, Vec<(String, BitPosition)>)> {
    let mut allocated = Vec::new();
    let mut retired = Vec::new();

    for action in store.list_actions().await? {
        match (action.bit_position, action.retired_position) {
            (Some(position), _) => allocated.push((action.slug, position)),
            (None, Some(position)) => retired.push((action.slug, position)),
            (None, None) => {}
        }
    }
    Ok((allocated, retired))
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupDefinition, RoleDefinition};
    use crate::error::AuthzError;
    use crate::sparse::{SparseConfig, StorageMode};
    use crate::store::InMemoryPermissionStore;

    struct User(&'static str);

    impl Principal for User {
        fn principal_type(&self) -> &str {
            "user"
        }

        fn principal_id(&self) -> String {
            self.0.to_string()
        }
    }

    fn actions() -> ActionConfig {
        ActionConfig::new()
            .with_category("users", ["view", "create"])
            .with_category("posts", ["view"])
    }

    async fn engine(config: EngineConfig) -> PermissionEngine {
        let mut registry = ResourceRegistry::new();
        registry.register("posts").unwrap();
        let engine = PermissionEngine::new(config, Arc::new(InMemoryPermissionStore::new()), registry)
            .await
            .unwrap();
        engine.rebuild_allocation(actions()).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_aggregate_scenario() {
        let engine = engine(EngineConfig::default()).await;
        let alice = User("alice");

        engine
            .aggregator()
            .assign_action(&alice.entity(), "users.view")
            .await
            .unwrap();
        engine
            .aggregator()
            .assign_action(&alice.entity(), "posts.view")
            .await
            .unwrap();

        assert_eq!(engine.aggregate(&alice).await.unwrap(), "5");
        assert!(!engine.has_action(&alice, "users.create").await.unwrap());
        assert!(engine
            .has_all_actions(&alice, &["users.view", "posts.view"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_sync_definitions() {
        let engine = engine(EngineConfig::default()).await;
        let mut definitions = Definitions::default();
        definitions.roles.insert(
            "viewer".to_string(),
            RoleDefinition {
                actions: vec!["users.view".to_string(), "posts.view".to_string()],
            },
        );
        definitions.groups.insert(
            "staff".to_string(),
            GroupDefinition {
                roles: vec!["viewer".to_string()],
                actions: vec!["users.create".to_string()],
            },
        );

        let summary = engine.sync_definitions(&definitions).await.unwrap();
        assert_eq!(summary, RebuildSummary { roles: 1, groups: 1 });

        let bob = User("bob");
        engine.aggregator().assign_group(&bob.entity(), "staff").await.unwrap();
        assert_eq!(engine.aggregate(&bob).await.unwrap(), "7");

        // narrowing the role is picked up on the next sync
        definitions.roles["viewer"].actions = vec!["posts.view".to_string()];
        engine.sync_definitions(&definitions).await.unwrap();
        assert_eq!(engine.aggregate(&bob).await.unwrap(), "6");
    }

    #[tokio::test]
    async fn test_sync_rejects_unknown_action() {
        let engine = engine(EngineConfig::default()).await;
        let mut definitions = Definitions::default();
        definitions.roles.insert(
            "ghost".to_string(),
            RoleDefinition {
                actions: vec!["nothing.here".to_string()],
            },
        );
        assert!(matches!(
            engine.sync_definitions(&definitions).await,
            Err(AuthzError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reordering_reports_drift_and_rebuilds() {
        let engine = engine(EngineConfig::default()).await;
        let carol = User("carol");
        engine.store().upsert_role("reader").await.unwrap();
        engine
            .aggregator()
            .assign_action(&EntityRef::role("reader"), "posts.view")
            .await
            .unwrap();
        engine.aggregator().assign_role(&carol.entity(), "reader").await.unwrap();
        engine.aggregator().rebuild_all().await.unwrap();
        assert!(engine.has_action(&carol, "posts.view").await.unwrap());

        let reordered = ActionConfig::new()
            .with_category("posts", ["view"])
            .with_category("users", ["view", "create"]);
        let report = engine.rebuild_allocation(reordered).await.unwrap();

        assert_eq!(report.drift.len(), 3);
        assert_eq!(report.rebuilt.roles, 1);
        // role mask was rebuilt against the new positions
        assert!(engine.has_action(&carol, "posts.view").await.unwrap());
        assert!(!engine.has_action(&carol, "users.view").await.unwrap());
        assert_eq!(engine.aggregate(&carol).await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_removed_action_is_demoted() {
        let engine = engine(EngineConfig::default()).await;
        let report = engine
            .rebuild_allocation(ActionConfig::new().with_category("users", ["view", "create"]))
            .await
            .unwrap();

        assert_eq!(report.demoted, vec!["posts.view".to_string()]);
        let record = engine.store().find_action("posts.view").await.unwrap().unwrap();
        assert!(record.is_relational_only());
        assert_eq!(record.retired_position, Some(2));
    }

    #[tokio::test]
    async fn test_malformed_action_json_allocates_nothing() {
        let engine = engine(EngineConfig::default()).await;
        let report = engine.rebuild_allocation_from_json("{oops").await.unwrap();

        assert!(report.table.is_empty());
        assert_eq!(report.demoted.len(), 3);
        assert!(!engine.has_action(&User("gina"), "users.view").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_only_keeps_positions_across_restart() {
        let store: Arc<dyn PermissionStore> = Arc::new(InMemoryPermissionStore::new());
        let mut config = EngineConfig::default();
        config.allocation.strategy = AllocationStrategy::AppendOnly;
        config.actions = actions();

        let first = PermissionEngine::new(config.clone(), store.clone(), ResourceRegistry::new())
            .await
            .unwrap();
        first.rebuild_allocation(actions()).await.unwrap();

        config.actions = ActionConfig::new()
            .with_category("posts", ["view", "delete"])
            .with_category("users", ["view", "create"]);
        let second = PermissionEngine::new(config.clone(), store, ResourceRegistry::new())
            .await
            .unwrap();
        let report = second.rebuild_allocation(config.actions.clone()).await.unwrap();

        assert!(report.drift.is_empty());
        assert_eq!(report.table.position_of("posts.view"), Some(2));
        assert_eq!(report.table.position_of("posts.delete"), Some(3));
    }

    #[tokio::test]
    async fn test_append_only_retired_bit_survives_restart() {
        let store: Arc<dyn PermissionStore> = Arc::new(InMemoryPermissionStore::new());
        let mut config = EngineConfig::default();
        config.allocation.strategy = AllocationStrategy::AppendOnly;
        config.actions = actions();

        let first = PermissionEngine::new(config.clone(), store.clone(), ResourceRegistry::new())
            .await
            .unwrap();
        first.rebuild_allocation(actions()).await.unwrap();

        let shrunk = ActionConfig::new().with_category("users", ["view", "create"]);
        let report = first.rebuild_allocation(shrunk.clone()).await.unwrap();
        assert_eq!(report.demoted, vec!["posts.view".to_string()]);

        config.actions = shrunk.with_category("comments", ["view"]);
        let second = PermissionEngine::new(config.clone(), store.clone(), ResourceRegistry::new())
            .await
            .unwrap();
        let report = second.rebuild_allocation(config.actions.clone()).await.unwrap();

        assert_eq!(report.table.position_of("comments.view"), Some(3));
        assert_eq!(report.table.retired().get("posts.view"), Some(&2));

        // bringing the slug back hands it its old bit
        config.actions = config.actions.clone().with_category("posts", ["view"]);
        let third = PermissionEngine::new(config.clone(), store.clone(), ResourceRegistry::new())
            .await
            .unwrap();
        let report = third.rebuild_allocation(config.actions.clone()).await.unwrap();
        assert_eq!(report.table.position_of("posts.view"), Some(2));
        let record = store.find_action("posts.view").await.unwrap().unwrap();
        assert_eq!(record.bit_position, Some(2));
        assert_eq!(record.retired_position, None);
    }

    #[tokio::test]
    async fn test_superadmin_can_act_on_any_instance() {
        let mut config = EngineConfig::default();
        config.superadmin.principal_ids = vec!["root".to_string()];
        let engine = engine(config).await;

        assert!(engine.is_super_admin(&User("root")).await);
        assert!(engine.user_can(&User("root"), "posts", "edit", "1").await.unwrap());
        assert!(!engine.user_can(&User("hana"), "posts", "edit", "1").await.unwrap());
    }

    #[tokio::test]
    async fn test_optimize_restore() {
        let engine = engine(EngineConfig {
            sparse: SparseConfig {
                mode: StorageMode::Auto,
                ..Default::default()
            },
            ..Default::default()
        })
        .await;

        let big = Bitmask::from_bit(9999).to_decimal_string();
        let stored = engine.optimize(&big).unwrap();
        assert_eq!(stored, StoredBitmask::Sparse(vec![9999]));
        assert_eq!(engine.restore(&stored), big);

        assert_eq!(engine.optimize("5").unwrap(), StoredBitmask::Dense("5".to_string()));
        assert!(engine.optimize("five").is_err());
    }

    #[tokio::test]
    async fn test_resource_grant_through_engine() {
        let engine = engine(EngineConfig::default()).await;
        let dave = User("dave");

        assert!(engine.grant(&dave, "posts.edit.9").await.unwrap());
        assert!(!engine.grant(&dave, "posts.edit.9").await.unwrap());
        assert!(engine.user_can(&dave, "posts", "edit", "9").await.unwrap());

        // relational-only grants never satisfy bit tests
        assert!(!engine.has_action(&dave, "posts.edit.9").await.unwrap());

        assert!(engine.revoke(&dave, "posts.edit.9").await.unwrap());
        assert!(!engine.user_can(&dave, "posts", "edit", "9").await.unwrap());
    }

    #[tokio::test]
    async fn test_superadmin_via_sentinel_and_custom() {
        let mut config = EngineConfig::default();
        config.superadmin.sentinel_action = Some("users.create".to_string());
        let engine = engine(config)
            .await
            .with_superadmin_predicate(|p| Ok(p.principal_id() == "root"));

        let erin = User("erin");
        assert!(!engine.is_super_admin(&erin).await);
        engine
            .aggregator()
            .assign_action(&erin.entity(), "users.create")
            .await
            .unwrap();
        assert_eq!(
            engine.super_admin_reason(&erin).await,
            Some(SuperadminCheck::SentinelAction)
        );

        assert_eq!(
            engine.super_admin_reason(&User("root")).await,
            Some(SuperadminCheck::Custom)
        );
        engine.gate().define("never", |_| Ok(false));
        assert!(engine.can(&User("root"), "never").await.unwrap());
        assert!(!engine.can(&User("frank"), "never").await.unwrap());
    }
}
