//! Representation-transparent bitmask persistence

use std::sync::Arc;
use tracing::debug;

use super::{Representation, SparseOptimizer, StoredBitmask};
use crate::bitmask::Bitmask;
use crate::error::Result;
use crate::store::PermissionStore;
use crate::types::EntityRef;

/// Reads and writes owner bitmasks without exposing how they are stored
///
/// `get_bitmask` returns the same value whether the owner is backed by a
/// decimal column or by sparse rows, and `set_bitmask` may migrate an owner
/// between the two on any write.
#[derive(Clone)]
pub struct BitmaskRepository {
    store: Arc<dyn PermissionStore>,
    optimizer: SparseOptimizer,
}

impl BitmaskRepository {
    /// Create a new repository
    pub fn new(store: Arc<dyn PermissionStore>, optimizer: SparseOptimizer) -> Self {
        Self { store, optimizer }
    }

    /// The optimizer deciding representations
    pub fn optimizer(&self) -> &SparseOptimizer {
        &self.optimizer
    }

    /// Bitmask of an owner; owners with nothing stored read as empty
    pub async fn get_bitmask(&self, owner: &EntityRef) -> Result<Bitmask> {
        Ok(self
            .store
            .load_bitmask(owner)
            .await?
            .map(|stored| self.optimizer.restore(&stored))
            .unwrap_or_default())
    }

    /// Persists a bitmask, returning the representation that was chosen
    pub async fn set_bitmask(&self, owner: &EntityRef, value: &Bitmask) -> Result<Representation> {
        let current = self.representation_of(owner).await?;
        let representation = self.optimizer.choose(value, current);

        if current.is_some() && current != Some(representation) {
            debug!(
                "Migrating bitmask of {} from {:?} to {:?}",
                owner, current, representation
            );
        }

        let stored = self.optimizer.encode(value, representation);
        self.store.store_bitmask(owner, &stored).await?;
        Ok(representation)
    }

    /// Physical representation currently backing an owner
    ///
    /// Diagnostic only: nothing in the permission path branches on it.
    pub async fn representation_of(&self, owner: &EntityRef) -> Result<Option<Representation>> {
        Ok(self
            .store
            .load_bitmask(owner)
            .await?
            .map(|stored| stored.representation()))
    }

    /// Re-evaluates the representation of an owner without changing its value
    pub async fn migrate(&self, owner: &EntityRef) -> Result<Representation> {
        let value = self.get_bitmask(owner).await?;
        self.set_bitmask(owner, &value).await
    }

    /// Raw stored form, as exchanged with external tooling
    pub async fn export(&self, owner: &EntityRef) -> Result<Option<StoredBitmask>> {
        self.store.load_bitmask(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{SparseConfig, StorageMode};
    use crate::store::InMemoryPermissionStore;

    fn repository(mode: StorageMode) -> BitmaskRepository {
        BitmaskRepository::new(
            Arc::new(InMemoryPermissionStore::new()),
            SparseOptimizer::new(SparseConfig {
                mode,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_missing_owner_reads_zero() {
        let repo = repository(StorageMode::Auto);
        let value = repo.get_bitmask(&EntityRef::role("ghost")).await.unwrap();
        assert!(value.is_zero());
        assert_eq!(repo.representation_of(&EntityRef::role("ghost")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_auto_mode_migrates_between_representations() {
        let repo = repository(StorageMode::Auto);
        let owner = EntityRef::role("auditor");

        let large = Bitmask::from_bit(9999);
        assert_eq!(repo.set_bitmask(&owner, &large).await.unwrap(), Representation::Sparse);
        assert_eq!(repo.get_bitmask(&owner).await.unwrap(), large);

        let small = Bitmask::from(6u64);
        assert_eq!(repo.set_bitmask(&owner, &small).await.unwrap(), Representation::Dense);
        assert_eq!(repo.get_bitmask(&owner).await.unwrap(), small);
    }

    #[tokio::test]
    async fn test_sparse_mode_always_rows() {
        let repo = repository(StorageMode::Sparse);
        let owner = EntityRef::group("ops");

        repo.set_bitmask(&owner, &Bitmask::from(5u64)).await.unwrap();
        assert_eq!(
            repo.export(&owner).await.unwrap(),
            Some(StoredBitmask::Sparse(vec![0, 2]))
        );
        assert_eq!(repo.get_bitmask(&owner).await.unwrap().to_string(), "5");
    }

    #[tokio::test]
    async fn test_migrate_preserves_value() {
        let store: Arc<dyn PermissionStore> = Arc::new(InMemoryPermissionStore::new());
        let owner = EntityRef::role("legacy");
        let value = Bitmask::from_bit(4000);

        let dense_repo = BitmaskRepository::new(store.clone(), SparseOptimizer::default());
        dense_repo.set_bitmask(&owner, &value).await.unwrap();

        let auto_repo = BitmaskRepository::new(
            store,
            SparseOptimizer::new(SparseConfig {
                mode: StorageMode::Auto,
                ..Default::default()
            }),
        );
        assert_eq!(auto_repo.migrate(&owner).await.unwrap(), Representation::Sparse);
        assert_eq!(auto_repo.get_bitmask(&owner).await.unwrap(), value);
    }
}
