//! In-memory permission store

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::PermissionStore;
use crate::bitmask::BitPosition;
use crate::error::{AuthzError, Result};
use crate::sparse::StoredBitmask;
use crate::types::{ActionRecord, EntityRef, GroupRecord, RoleRecord, SparseBit};

#[derive(Default)]
struct StoreState {
    next_id: u64,
    actions: HashMap<String, ActionRecord>,
    roles: HashMap<String, RoleRecord>,
    groups: HashMap<String, GroupRecord>,
    /// holder -> targets
    edges: BTreeMap<EntityRef, BTreeSet<EntityRef>>,
    /// target -> holders
    reverse_edges: BTreeMap<EntityRef, BTreeSet<EntityRef>>,
    dense: HashMap<EntityRef, String>,
    sparse: HashMap<EntityRef, BTreeSet<BitPosition>>,
}

impl StoreState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_entity(&mut self, entity: &EntityRef) {
        if let Some(targets) = self.edges.remove(entity) {
            for target in targets {
                if let Some(holders) = self.reverse_edges.get_mut(&target) {
                    holders.remove(entity);
                }
            }
        }
        if let Some(holders) = self.reverse_edges.remove(entity) {
            for holder in holders {
                if let Some(targets) = self.edges.get_mut(&holder) {
                    targets.remove(entity);
                }
            }
        }
        self.dense.remove(entity);
        self.sparse.remove(entity);
    }
}

/// In-memory store implementation
///
/// All mutations run under a single write lock, so each call is atomic.
pub struct InMemoryPermissionStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryPermissionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for InMemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by_id<T: Clone>(items: impl Iterator<Item = T>, id: impl Fn(&T) -> u64) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| id(item));
    items
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn upsert_action(
        &self,
        slug: &str,
        bit_position: Option<BitPosition>,
        description: Option<String>,
    ) -> Result<ActionRecord> {
        if slug.is_empty() {
            return Err(AuthzError::InvalidInput("Action slug cannot be empty".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.actions.get_mut(slug) {
            existing.bit_position = bit_position;
            if bit_position.is_some() {
                existing.retired_position = None;
            }
            if description.is_some() {
                existing.description = description;
            }
            return Ok(existing.clone());
        }

        let record = ActionRecord {
            id: state.allocate_id(),
            slug: slug.to_string(),
            bit_position,
            retired_position: None,
            description,
        };
        state.actions.insert(slug.to_string(), record.clone());
        Ok(record)
    }

    async fn retire_action(&self, slug: &str, position: BitPosition) -> Result<ActionRecord> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.actions.get_mut(slug) {
            existing.bit_position = None;
            existing.retired_position = Some(position);
            return Ok(existing.clone());
        }

        let record = ActionRecord {
            id: state.allocate_id(),
            slug: slug.to_string(),
            bit_position: None,
            retired_position: Some(position),
            description: None,
        };
        state.actions.insert(slug.to_string(), record.clone());
        Ok(record)
    }

    async fn ensure_action(&self, slug: &str) -> Result<ActionRecord> {
        if slug.is_empty() {
            return Err(AuthzError::InvalidInput("Action slug cannot be empty".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.actions.get(slug) {
            return Ok(existing.clone());
        }

        let record = ActionRecord {
            id: state.allocate_id(),
            slug: slug.to_string(),
            bit_position: None,
            retired_position: None,
            description: None,
        };
        state.actions.insert(slug.to_string(), record.clone());
        Ok(record)
    }

    async fn find_action(&self, slug: &str) -> Result<Option<ActionRecord>> {
        let state = self.state.read().await;
        Ok(state.actions.get(slug).cloned())
    }

    async fn list_actions(&self) -> Result<Vec<ActionRecord>> {
        let state = self.state.read().await;
        Ok(sorted_by_id(state.actions.values().cloned(), |a| a.id))
    }

    async fn delete_action(&self, slug: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.actions.remove(slug).is_none() {
            return Ok(false);
        }
        state.remove_entity(&EntityRef::action(slug));
        Ok(true)
    }

    async fn upsert_role(&self, slug: &str) -> Result<RoleRecord> {
        if slug.is_empty() {
            return Err(AuthzError::InvalidInput("Role slug cannot be empty".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.roles.get(slug) {
            return Ok(existing.clone());
        }

        let record = RoleRecord {
            id: state.allocate_id(),
            slug: slug.to_string(),
        };
        state.roles.insert(slug.to_string(), record.clone());
        Ok(record)
    }

    async fn find_role(&self, slug: &str) -> Result<Option<RoleRecord>> {
        let state = self.state.read().await;
        Ok(state.roles.get(slug).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>> {
        let state = self.state.read().await;
        Ok(sorted_by_id(state.roles.values().cloned(), |r| r.id))
    }

    async fn upsert_group(&self, slug: &str) -> Result<GroupRecord> {
        if slug.is_empty() {
            return Err(AuthzError::InvalidInput("Group slug cannot be empty".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.groups.get(slug) {
            return Ok(existing.clone());
        }

        let record = GroupRecord {
            id: state.allocate_id(),
            slug: slug.to_string(),
        };
        state.groups.insert(slug.to_string(), record.clone());
        Ok(record)
    }

    async fn find_group(&self, slug: &str) -> Result<Option<GroupRecord>> {
        let state = self.state.read().await;
        Ok(state.groups.get(slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>> {
        let state = self.state.read().await;
        Ok(sorted_by_id(state.groups.values().cloned(), |g| g.id))
    }

    async fn attach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool> {
        let mut state = self.state.write().await;
        let inserted = state
            .edges
            .entry(holder.clone())
            .or_default()
            .insert(target.clone());
        state
            .reverse_edges
            .entry(target.clone())
            .or_default()
            .insert(holder.clone());
        Ok(inserted)
    }

    async fn detach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = state
            .edges
            .get_mut(holder)
            .map(|targets| targets.remove(target))
            .unwrap_or(false);
        if let Some(holders) = state.reverse_edges.get_mut(target) {
            holders.remove(holder);
        }
        Ok(removed)
    }

    async fn attached(&self, holder: &EntityRef, target_type: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .get(holder)
            .map(|targets| {
                targets
                    .iter()
                    .filter(|t| t.entity_type == target_type)
                    .map(|t| t.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn holders_of(&self, target: &EntityRef) -> Result<Vec<EntityRef>> {
        let state = self.state.read().await;
        Ok(state
            .reverse_edges
            .get(target)
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_bitmask(&self, owner: &EntityRef) -> Result<Option<StoredBitmask>> {
        let state = self.state.read().await;
        if let Some(bits) = state.sparse.get(owner) {
            return Ok(Some(StoredBitmask::Sparse(bits.iter().copied().collect())));
        }
        Ok(state.dense.get(owner).cloned().map(StoredBitmask::Dense))
    }

    async fn store_bitmask(&self, owner: &EntityRef, value: &StoredBitmask) -> Result<()> {
        let mut state = self.state.write().await;
        match value {
            StoredBitmask::Dense(decimal) => {
                state.sparse.remove(owner);
                state.dense.insert(owner.clone(), decimal.clone());
            }
            StoredBitmask::Sparse(positions) => {
                state.dense.remove(owner);
                // delete-then-insert under the same lock
                state.sparse.remove(owner);
                if !positions.is_empty() {
                    state
                        .sparse
                        .insert(owner.clone(), positions.iter().copied().collect());
                }
            }
        }
        Ok(())
    }

    async fn sparse_rows(&self, owner: &EntityRef) -> Result<Vec<SparseBit>> {
        let state = self.state.read().await;
        Ok(state
            .sparse
            .get(owner)
            .map(|bits| {
                bits.iter()
                    .map(|&bit_position| SparseBit {
                        owner_type: owner.entity_type.clone(),
                        owner_id: owner.id.clone(),
                        bit_position,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
