//! Relational storage for actions, roles, groups, assignments and bitmasks
//!
//! The engine never talks to a database directly; it goes through
//! [`PermissionStore`]. Assignments are modelled as one generic edge table
//! (`holder -> target`), which covers every join table the engine needs:
//!
//! | holder    | target  | meaning                       |
//! |-----------|---------|-------------------------------|
//! | principal | action  | direct grant / resource grant |
//! | principal | role    | role membership               |
//! | principal | group   | group membership              |
//! | role      | action  | role definition               |
//! | group     | role    | group definition              |
//! | group     | action  | group definition              |

use async_trait::async_trait;

use crate::bitmask::BitPosition;
use crate::error::Result;
use crate::sparse::StoredBitmask;
use crate::types::{ActionRecord, EntityRef, GroupRecord, RoleRecord, SparseBit};

mod memory;

pub use memory::InMemoryPermissionStore;

/// Storage backend trait
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Create or update an action, overwriting its bit position
    async fn upsert_action(
        &self,
        slug: &str,
        bit_position: Option<BitPosition>,
        description: Option<String>,
    ) -> Result<ActionRecord>;

    /// Demote an action to relational-only, remembering its last position
    ///
    /// A later `upsert_action` with a position clears the retired one.
    async fn retire_action(&self, slug: &str, position: BitPosition) -> Result<ActionRecord>;

    /// Create a relational-only action if it does not exist yet
    ///
    /// An existing action is returned untouched.
    async fn ensure_action(&self, slug: &str) -> Result<ActionRecord>;

    /// Get an action by slug
    async fn find_action(&self, slug: &str) -> Result<Option<ActionRecord>>;

    /// List all actions ordered by id
    async fn list_actions(&self) -> Result<Vec<ActionRecord>>;

    /// Delete an action with its assignments and stored bitmask
    async fn delete_action(&self, slug: &str) -> Result<bool>;

    /// Create a role if missing
    async fn upsert_role(&self, slug: &str) -> Result<RoleRecord>;

    /// Get a role by slug
    async fn find_role(&self, slug: &str) -> Result<Option<RoleRecord>>;

    /// List all roles ordered by id
    async fn list_roles(&self) -> Result<Vec<RoleRecord>>;

    /// Create a group if missing
    async fn upsert_group(&self, slug: &str) -> Result<GroupRecord>;

    /// Get a group by slug
    async fn find_group(&self, slug: &str) -> Result<Option<GroupRecord>>;

    /// List all groups ordered by id
    async fn list_groups(&self) -> Result<Vec<GroupRecord>>;

    /// Add an assignment edge, returning `false` if it already existed
    async fn attach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool>;

    /// Remove an assignment edge, returning `false` if it was absent
    async fn detach(&self, holder: &EntityRef, target: &EntityRef) -> Result<bool>;

    /// Ids of every target of the given type attached to `holder`, sorted
    async fn attached(&self, holder: &EntityRef, target_type: &str) -> Result<Vec<String>>;

    /// Every holder that has `target` attached, sorted
    async fn holders_of(&self, target: &EntityRef) -> Result<Vec<EntityRef>>;

    /// Physical bitmask of an owner, `None` if nothing was ever stored
    async fn load_bitmask(&self, owner: &EntityRef) -> Result<Option<StoredBitmask>>;

    /// Replace the physical bitmask of an owner
    ///
    /// Switching to sparse deletes the dense column and replaces every
    /// sparse row as one unit; readers never observe a partial bit set.
    async fn store_bitmask(&self, owner: &EntityRef, value: &StoredBitmask) -> Result<()>;

    /// Raw sparse rows of an owner, ascending by position
    async fn sparse_rows(&self, owner: &EntityRef) -> Result<Vec<SparseBit>>;
}
