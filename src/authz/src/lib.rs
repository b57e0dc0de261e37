//! # Permask Authorization Engine
//!
//! Bitmask permission computation with arbitrary-precision bits.
//!
//! ## Features
//!
//! - **Deterministic bit allocation** from an ordered action tree, with an
//!   append-only strategy and drift detection for reordered configs
//! - **Aggregation** of direct actions, roles and groups by bitwise OR, so
//!   `has_action` is a single bit test
//! - **Sparse storage** of masks with few high bits, invisible to callers
//! - **Resource grants** per instance with category and full wildcards and
//!   parent -> child inheritance
//! - **Superadmin chain** in front of every ability check
//! - **TTL caching** with cascading invalidation
//!
//! ## Example
//!
//! ```rust
//! use permask_authz::{
//!     ActionConfig, EngineConfig, InMemoryPermissionStore, PermissionEngine, Principal,
//!     ResourceRegistry,
//! };
//! use std::sync::Arc;
//!
//! struct User(u64);
//!
//! impl Principal for User {
//!     fn principal_type(&self) -> &str {
//!         "user"
//!     }
//!
//!     fn principal_id(&self) -> String {
//!         self.0.to_string()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = PermissionEngine::new(
//!         EngineConfig::default(),
//!         Arc::new(InMemoryPermissionStore::new()),
//!         ResourceRegistry::new(),
//!     )
//!     .await?;
//!
//!     let actions = ActionConfig::new()
//!         .with_category("users", ["view", "create"])
//!         .with_category("posts", ["view"]);
//!     engine.rebuild_allocation(actions).await?;
//!
//!     let alice = User(1);
//!     engine.aggregator().assign_action(&alice.entity(), "users.view").await?;
//!     engine.aggregator().assign_action(&alice.entity(), "posts.view").await?;
//!
//!     assert_eq!(engine.aggregate(&alice).await?, "5");
//!     assert!(!engine.has_action(&alice, "users.create").await?);
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod allocator;
pub mod bitmask;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod resource;
pub mod sparse;
pub mod store;
pub mod superadmin;
pub mod types;

// Re-export commonly used types
pub use aggregator::{Aggregator, RebuildSummary};
pub use allocator::{ActionConfig, AllocationStrategy, AllocationTable, BitAllocator};
pub use bitmask::{BitPosition, Bitmask};
pub use cache::{CacheConfig, CacheStats, PermissionCache};
pub use config::{Definitions, EngineConfig};
pub use engine::{AllocationReport, PermissionEngine};
pub use error::{AuthzError, Result};
pub use gate::{AbilityGate, GateDecision, GateReason};
pub use resource::{
    AccessMode, ChildAccess, ChildIndex, GrantMatch, PermissionResource, ResourceDependency,
    ResourceRegistry, ResourceResolver, ResourceScope, ResourceSlug,
};
pub use sparse::{BitmaskRepository, SparseConfig, SparseOptimizer, StorageMode, StoredBitmask};
pub use store::{InMemoryPermissionStore, PermissionStore};
pub use superadmin::{SuperadminChain, SuperadminCheck, SuperadminConfig};
pub use types::{EntityRef, Principal};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
