//! Effective permission aggregation
//!
//! A principal's effective bitmask is the OR of the bitmasks of its direct
//! actions, its roles and its groups. Once a slug is resolved to a bit
//! position, `has_action` is a single bit test no matter how many roles or
//! groups are involved.
//!
//! Role and group bitmasks are stored values, refreshed only by
//! [`Aggregator::rebuild_role`], [`Aggregator::rebuild_group`] or
//! [`Aggregator::rebuild_all`]. Between rebuilds a role's stored mask may
//! lag behind its assignments.

use futures::future::try_join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::allocator::BitAllocator;
use crate::bitmask::Bitmask;
use crate::cache::PermissionCache;
use crate::error::{AuthzError, Result};
use crate::sparse::BitmaskRepository;
use crate::store::PermissionStore;
use crate::types::{EntityRef, ACTION_TYPE, GROUP_TYPE, ROLE_TYPE};

/// Counts from a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Roles recomputed
    pub roles: usize,
    /// Groups recomputed
    pub groups: usize,
}

/// Computes effective bitmasks and answers action checks
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn PermissionStore>,
    bitmasks: BitmaskRepository,
    allocator: Arc<RwLock<BitAllocator>>,
    cache: Option<Arc<PermissionCache>>,
}

impl Aggregator {
    /// Create a new aggregator
    pub fn new(
        store: Arc<dyn PermissionStore>,
        bitmasks: BitmaskRepository,
        allocator: Arc<RwLock<BitAllocator>>,
        cache: Option<Arc<PermissionCache>>,
    ) -> Self {
        Self {
            store,
            bitmasks,
            allocator,
            cache,
        }
    }

    /// Bitmask repository used for every read and write
    pub fn bitmasks(&self) -> &BitmaskRepository {
        &self.bitmasks
    }

    /// OR of direct-action, role and group bitmasks
    pub async fn effective_bitmask(&self, principal: &EntityRef) -> Result<Bitmask> {
        if let Some(cache) = &self.cache {
            if let Some(mask) = cache.get_aggregate(principal) {
                debug!("Aggregate cache hit for {}", principal);
                return Ok(mask);
            }
        }

        let mask = self.compute_effective(principal).await?;

        if let Some(cache) = &self.cache {
            cache.put_aggregate(principal, mask.clone());
        }
        Ok(mask)
    }

    async fn compute_effective(&self, principal: &EntityRef) -> Result<Bitmask> {
        let mut sources = Vec::new();
        for (target_type, to_ref) in [
            (ACTION_TYPE, EntityRef::action as fn(String) -> EntityRef),
            (ROLE_TYPE, EntityRef::role),
            (GROUP_TYPE, EntityRef::group),
        ] {
            let ids = self.store.attached(principal, target_type).await?;
            sources.extend(ids.into_iter().map(to_ref));
        }

        let masks = try_join_all(sources.iter().map(|source| self.bitmasks.get_bitmask(source))).await?;
        Ok(Bitmask::combine(&masks))
    }

    /// Whether the principal holds an action
    ///
    /// Unknown slugs and relational-only actions (zero bitmask) are never
    /// satisfied here; they resolve to `false` rather than an error.
    pub async fn has_action(&self, principal: &EntityRef, slug: &str) -> Result<bool> {
        if let Some(cache) = &self.cache {
            if let Some(allowed) = cache.get_check(principal, slug) {
                return Ok(allowed);
            }
        }

        let effective = self.effective_bitmask(principal).await?;
        let allowed = self.test_action(&effective, slug).await?;
        debug!("has_action({}, {}) = {}", principal, slug, allowed);

        if let Some(cache) = &self.cache {
            cache.put_check(principal, slug, allowed);
        }
        Ok(allowed)
    }

    /// True if the principal holds at least one of the actions
    pub async fn has_any_action<S: AsRef<str>>(&self, principal: &EntityRef, slugs: &[S]) -> Result<bool> {
        let effective = self.effective_bitmask(principal).await?;
        for slug in slugs {
            if self.test_action(&effective, slug.as_ref()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if the principal holds every one of the actions
    pub async fn has_all_actions<S: AsRef<str>>(&self, principal: &EntityRef, slugs: &[S]) -> Result<bool> {
        let effective = self.effective_bitmask(principal).await?;
        for slug in slugs {
            if !self.test_action(&effective, slug.as_ref()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Tests one slug against an already computed effective mask
    async fn test_action(&self, effective: &Bitmask, slug: &str) -> Result<bool> {
        let position = self.allocator.read().await.resolve(slug, None);
        if let Some(position) = position {
            return Ok(effective.has_bit(position));
        }

        if self.store.find_action(slug).await?.is_none() {
            debug!("Unresolvable action slug '{}'", slug);
            return Ok(false);
        }

        let target = self.bitmasks.get_bitmask(&EntityRef::action(slug)).await?;
        let position = self.allocator.read().await.resolve(slug, Some(&target));
        if let Some(position) = position {
            return Ok(effective.has_bit(position));
        }

        // 0 & 0 == 0 must never count as a grant
        if target.is_zero() {
            return Ok(false);
        }
        Ok(effective.has_all_bits(&target))
    }

    /// Grants an action directly to a holder (principal, role or group)
    pub async fn assign_action(&self, holder: &EntityRef, slug: &str) -> Result<bool> {
        if self.store.find_action(slug).await?.is_none() {
            return Err(AuthzError::NotFound(format!("action '{}'", slug)));
        }
        self.attach(holder, &EntityRef::action(slug)).await
    }

    /// Removes a direct action from a holder
    pub async fn revoke_action(&self, holder: &EntityRef, slug: &str) -> Result<bool> {
        self.detach(holder, &EntityRef::action(slug)).await
    }

    /// Adds a principal (or group) to a role
    pub async fn assign_role(&self, holder: &EntityRef, role: &str) -> Result<bool> {
        if self.store.find_role(role).await?.is_none() {
            return Err(AuthzError::NotFound(format!("role '{}'", role)));
        }
        self.attach(holder, &EntityRef::role(role)).await
    }

    /// Removes a principal (or group) from a role
    pub async fn revoke_role(&self, holder: &EntityRef, role: &str) -> Result<bool> {
        self.detach(holder, &EntityRef::role(role)).await
    }

    /// Adds a principal to a group
    pub async fn assign_group(&self, principal: &EntityRef, group: &str) -> Result<bool> {
        if self.store.find_group(group).await?.is_none() {
            return Err(AuthzError::NotFound(format!("group '{}'", group)));
        }
        self.attach(principal, &EntityRef::group(group)).await
    }

    /// Removes a principal from a group
    pub async fn revoke_group(&self, principal: &EntityRef, group: &str) -> Result<bool> {
        self.detach(principal, &EntityRef::group(group)).await
    }

    /// Includes a role in a group definition
    pub async fn attach_role_to_group(&self, group: &str, role: &str) -> Result<bool> {
        if self.store.find_group(group).await?.is_none() {
            return Err(AuthzError::NotFound(format!("group '{}'", group)));
        }
        self.assign_role(&EntityRef::group(group), role).await
    }

    /// Drops a role from a group definition
    pub async fn detach_role_from_group(&self, group: &str, role: &str) -> Result<bool> {
        self.revoke_role(&EntityRef::group(group), role).await
    }

    async fn attach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool> {
        let changed = self.store.attach(holder, target).await?;
        self.invalidate_dependents(holder).await?;
        Ok(changed)
    }

    async fn detach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool> {
        let changed = self.store.detach(holder, target).await?;
        self.invalidate_dependents(holder).await?;
        Ok(changed)
    }

    /// Invalidates an entity and every holder that transitively depends on it
    pub async fn invalidate_dependents(&self, entity: &EntityRef) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let mut seen: HashSet<EntityRef> = HashSet::new();
        let mut queue: VecDeque<EntityRef> = VecDeque::from([entity.clone()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            cache.invalidate(&current);

            if current.is_container() || current.entity_type == ACTION_TYPE {
                for holder in self.store.holders_of(&current).await? {
                    queue.push_back(holder);
                }
            }
        }

        debug!("Invalidated {} cache entities from {}", seen.len(), entity);
        Ok(())
    }

    /// Recomputes and stores a role's bitmask from its actions
    pub async fn rebuild_role(&self, slug: &str) -> Result<Bitmask> {
        if self.store.find_role(slug).await?.is_none() {
            return Err(AuthzError::NotFound(format!("role '{}'", slug)));
        }

        let role = EntityRef::role(slug);
        let actions = self.store.attached(&role, ACTION_TYPE).await?;
        let sources: Vec<EntityRef> = actions.into_iter().map(EntityRef::action).collect();
        let mask = self.combine_sources(&sources).await?;

        self.bitmasks.set_bitmask(&role, &mask).await?;
        self.invalidate_dependents(&role).await?;
        debug!("Rebuilt role '{}' ({} bits)", slug, mask.bit_count());
        Ok(mask)
    }

    /// Recomputes and stores a group's bitmask from its actions and roles
    ///
    /// Uses the roles' stored bitmasks; rebuild roles first for a fresh
    /// result.
    pub async fn rebuild_group(&self, slug: &str) -> Result<Bitmask> {
        if self.store.find_group(slug).await?.is_none() {
            return Err(AuthzError::NotFound(format!("group '{}'", slug)));
        }

        let group = EntityRef::group(slug);
        let mut sources: Vec<EntityRef> = self
            .store
            .attached(&group, ACTION_TYPE)
            .await?
            .into_iter()
            .map(EntityRef::action)
            .collect();
        sources.extend(
            self.store
                .attached(&group, ROLE_TYPE)
                .await?
                .into_iter()
                .map(EntityRef::role),
        );
        let mask = self.combine_sources(&sources).await?;

        self.bitmasks.set_bitmask(&group, &mask).await?;
        self.invalidate_dependents(&group).await?;
        debug!("Rebuilt group '{}' ({} bits)", slug, mask.bit_count());
        Ok(mask)
    }

    /// Rebuilds every role, then every group
    pub async fn rebuild_all(&self) -> Result<RebuildSummary> {
        let roles = self.store.list_roles().await?;
        for role in &roles {
            self.rebuild_role(&role.slug).await?;
        }

        let groups = self.store.list_groups().await?;
        for group in &groups {
            self.rebuild_group(&group.slug).await?;
        }

        info!("Rebuilt {} roles and {} groups", roles.len(), groups.len());
        Ok(RebuildSummary {
            roles: roles.len(),
            groups: groups.len(),
        })
    }

    async fn combine_sources(&self, sources: &[EntityRef]) -> Result<Bitmask> {
        let masks = try_join_all(sources.iter().map(|source| self.bitmasks.get_bitmask(source))).await?;
        Ok(Bitmask::combine(&masks))
    }
}
