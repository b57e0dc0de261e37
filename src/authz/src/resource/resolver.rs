//! Resource grant resolution
//!
//! Grants are relational-only actions attached directly to the principal.
//! Checks never touch bit positions: a grant is satisfied by the exact
//! presence of one of three slugs, tried in order of precedence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::registry::{PermissionResource, ResourceRegistry};
use super::slug::{GrantMatch, ResourceSlug};
use crate::aggregator::Aggregator;
use crate::error::{AuthzError, Result};
use crate::store::PermissionStore;
use crate::types::{EntityRef, ACTION_TYPE};

/// Instances a principal may act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "ids", rename_all = "lowercase")]
pub enum ResourceScope {
    /// Every instance, current and future
    All,
    /// Exactly these instances; empty means none
    Only(BTreeSet<String>),
}

impl ResourceScope {
    /// Whether the scope admits an instance
    pub fn allows(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(id),
        }
    }

    /// Whether nothing is admitted
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(ids) if ids.is_empty())
    }
}

/// How a principal reaches the children of one parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Inherited through the parent grant
    All,
    /// Explicit per-child grants
    Selected,
}

/// Result of a dependency lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAccess {
    /// Access mode
    pub mode: AccessMode,

    /// Child ids with direct grants; empty in `All` mode
    pub child_ids: BTreeSet<String>,
}

/// Resolves and mutates resource grants
#[derive(Clone)]
pub struct ResourceResolver {
    store: Arc<dyn PermissionStore>,
    aggregator: Aggregator,
    registry: Arc<ResourceRegistry>,
}

impl ResourceResolver {
    /// Create a new resolver
    pub fn new(store: Arc<dyn PermissionStore>, aggregator: Aggregator, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            store,
            aggregator,
            registry,
        }
    }

    /// Declared resource types
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    async fn direct_grants(&self, principal: &EntityRef) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .attached(principal, ACTION_TYPE)
            .await?
            .into_iter()
            .collect())
    }

    /// Which grant form allows `action` on one instance, if any
    ///
    /// Instance grants win over category grants, which win over the full
    /// wildcard.
    pub async fn explain(
        &self,
        principal: &EntityRef,
        key: &str,
        action: &str,
        id: &str,
    ) -> Result<Option<GrantMatch>> {
        self.registry.require(key)?;
        let grants = self.direct_grants(principal).await?;

        let matched = ResourceSlug::candidates(key, action, id)
            .into_iter()
            .find(|(_, slug)| grants.contains(slug))
            .map(|(kind, _)| kind);

        debug!("user_can({}, {}.{}.{}) -> {:?}", principal, key, action, id, matched);
        Ok(matched)
    }

    /// Whether the principal may perform `action` on one instance
    pub async fn user_can(&self, principal: &EntityRef, key: &str, action: &str, id: &str) -> Result<bool> {
        Ok(self.explain(principal, key, action, id).await?.is_some())
    }

    /// [`user_can`](Self::user_can) for a domain object
    pub async fn user_can_on(
        &self,
        principal: &EntityRef,
        resource: &dyn PermissionResource,
        action: &str,
    ) -> Result<bool> {
        self.user_can(principal, resource.resource_key(), action, &resource.resource_id())
            .await
    }

    /// Attaches a grant; granting twice is the same as granting once
    pub async fn grant(&self, principal: &EntityRef, slug: &ResourceSlug) -> Result<bool> {
        self.registry.require(slug.key())?;
        let slug = slug.to_string();
        self.store.ensure_action(&slug).await?;
        let changed = self.aggregator.assign_action(principal, &slug).await?;
        if changed {
            info!("Granted {} to {}", slug, principal);
        }
        Ok(changed)
    }

    /// Detaches a grant; revoking an absent grant is a no-op
    pub async fn revoke(&self, principal: &EntityRef, slug: &ResourceSlug) -> Result<bool> {
        self.registry.require(slug.key())?;
        let slug = slug.to_string();
        let changed = self.aggregator.revoke_action(principal, &slug).await?;
        if changed {
            info!("Revoked {} from {}", slug, principal);
        }
        Ok(changed)
    }

    /// Instances the principal may perform `action` on
    pub async fn scope_for(&self, principal: &EntityRef, key: &str, action: &str) -> Result<ResourceScope> {
        self.registry.require(key)?;
        let grants = self.direct_grants(principal).await?;

        let [_, (_, category), (_, wildcard)] = ResourceSlug::candidates(key, action, "");
        if grants.contains(&category) || grants.contains(&wildcard) {
            return Ok(ResourceScope::All);
        }

        Ok(ResourceScope::Only(instance_ids(&grants, key, action)))
    }

    /// Instances the principal may view
    pub async fn viewable(&self, principal: &EntityRef, key: &str) -> Result<ResourceScope> {
        self.scope_for(principal, key, "view").await
    }

    /// Instances the principal may edit
    pub async fn editable(&self, principal: &EntityRef, key: &str) -> Result<ResourceScope> {
        self.scope_for(principal, key, "edit").await
    }

    /// Instances the principal may delete
    pub async fn deletable(&self, principal: &EntityRef, key: &str) -> Result<ResourceScope> {
        self.scope_for(principal, key, "delete").await
    }

    /// How the principal reaches `child_key` instances under one parent
    pub async fn get_access(
        &self,
        principal: &EntityRef,
        parent_key: &str,
        parent_id: &str,
        child_key: &str,
        action: &str,
    ) -> Result<ChildAccess> {
        let dependency = self.registry.dependency_of(child_key)?;
        if dependency.parent_key != parent_key {
            return Err(AuthzError::InvalidInput(format!(
                "Resource '{}' depends on '{}', not '{}'",
                child_key, dependency.parent_key, parent_key
            )));
        }

        let parent_action = dependency.parent_action(action);
        if self.user_can(principal, parent_key, parent_action, parent_id).await? {
            return Ok(ChildAccess {
                mode: AccessMode::All,
                child_ids: BTreeSet::new(),
            });
        }

        let child_ids = self.direct_child_ids(principal, child_key, action, parent_id).await?;
        Ok(ChildAccess {
            mode: AccessMode::Selected,
            child_ids,
        })
    }

    /// Switches between inherited and per-child access
    ///
    /// `All` grants the mapped parent action and drops every direct child
    /// grant. `Selected` drops the parent grant and syncs child grants to
    /// exactly `child_ids`. Grants on other resource types are untouched.
    ///
    /// Only the instance parent grant can be dropped here. When the parent
    /// access comes from a category or wildcard grant (`projects.read`,
    /// `projects.*`), `Selected` fails with [`AuthzError::InvalidInput`]
    /// before anything changes.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_access(
        &self,
        principal: &EntityRef,
        parent_key: &str,
        parent_id: &str,
        child_key: &str,
        action: &str,
        mode: AccessMode,
        child_ids: &[String],
    ) -> Result<()> {
        let dependency = self.registry.dependency_of(child_key)?;
        if dependency.parent_key != parent_key {
            return Err(AuthzError::InvalidInput(format!(
                "Resource '{}' depends on '{}', not '{}'",
                child_key, dependency.parent_key, parent_key
            )));
        }

        let parent_slug = ResourceSlug::instance(parent_key, dependency.parent_action(action), parent_id)?;
        let current = self.direct_child_ids(principal, child_key, action, parent_id).await?;

        match mode {
            AccessMode::All => {
                self.grant(principal, &parent_slug).await?;
                for id in &current {
                    self.revoke(principal, &ResourceSlug::instance(child_key, action, id.as_str())?)
                        .await?;
                }
            }
            AccessMode::Selected => {
                let inherited = self
                    .explain(principal, parent_key, dependency.parent_action(action), parent_id)
                    .await?;
                if let Some(kind @ (GrantMatch::Category | GrantMatch::Wildcard)) = inherited {
                    return Err(AuthzError::InvalidInput(format!(
                        "{} reaches {}:{} through a {:?} grant; revoke it before selecting {} individually",
                        principal, parent_key, parent_id, kind, child_key
                    )));
                }

                self.revoke(principal, &parent_slug).await?;

                let wanted: BTreeSet<String> = child_ids.iter().cloned().collect();
                for id in current.difference(&wanted) {
                    self.revoke(principal, &ResourceSlug::instance(child_key, action, id.as_str())?)
                        .await?;
                }
                for id in wanted.difference(&current) {
                    self.grant(principal, &ResourceSlug::instance(child_key, action, id.as_str())?)
                        .await?;
                }
            }
        }

        info!(
            "Set {:?} access on {}.{} under {}:{} for {}",
            mode, child_key, action, parent_key, parent_id, principal
        );
        Ok(())
    }

    /// Direct child grants, narrowed to one parent when an index is known
    async fn direct_child_ids(
        &self,
        principal: &EntityRef,
        child_key: &str,
        action: &str,
        parent_id: &str,
    ) -> Result<BTreeSet<String>> {
        let grants = self.direct_grants(principal).await?;
        let mut ids = instance_ids(&grants, child_key, action);

        if let Some(index) = self.registry.require(child_key)?.child_index() {
            let children: BTreeSet<String> = index.children_of(parent_id).await?.into_iter().collect();
            ids.retain(|id| children.contains(id));
        }
        Ok(ids)
    }
}

fn instance_ids(grants: &BTreeSet<String>, key: &str, action: &str) -> BTreeSet<String> {
    let prefix = ResourceSlug::instance_prefix(key, action);
    grants
        .iter()
        .filter_map(|slug| slug.strip_prefix(prefix.as_str()))
        .map(str::to_string)
        .collect()
}
