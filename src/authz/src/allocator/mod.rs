//! Bit allocator
//!
//! Maps action slugs to bit positions. The table is an explicit value owned
//! by whoever needs it (normally the engine) and is only ever replaced by an
//! explicit [`BitAllocator::rebuild`]; there is no process-wide lookup cache.
//!
//! # Example
//!
//! ```
//! use permask_authz::allocator::{ActionConfig, AllocationStrategy, BitAllocator};
//!
//! let config = ActionConfig::new()
//!     .with_category("users", ["view", "create"])
//!     .with_category("posts", ["view"]);
//!
//! let allocator = BitAllocator::new(config, AllocationStrategy::ConfigOrder);
//! assert_eq!(allocator.resolve("posts.view", None), Some(2));
//! ```

mod config;
mod table;

pub use config::{ActionConfig, ActionDescriptor};
pub use table::{AllocatedAction, AllocationTable, PositionDrift};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bitmask::{BitPosition, Bitmask};

/// How positions are assigned on rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Recompute from declaration order every time
    #[default]
    ConfigOrder,
    /// Keep every position ever assigned, append new slugs
    AppendOnly,
}

/// Owns the action config and the current allocation table
#[derive(Debug, Clone)]
pub struct BitAllocator {
    config: ActionConfig,
    strategy: AllocationStrategy,
    table: AllocationTable,
    /// What `rebuild` would produce now; consulted on table misses
    projected: AllocationTable,
}

impl BitAllocator {
    /// Create an allocator and build its initial table
    pub fn new(config: ActionConfig, strategy: AllocationStrategy) -> Self {
        let table = AllocationTable::from_config(&config);
        Self {
            config,
            strategy,
            projected: table.clone(),
            table,
        }
    }

    /// Create an allocator continuing from a persisted table
    ///
    /// With [`AllocationStrategy::AppendOnly`] this is what keeps positions
    /// stable across restarts.
    pub fn with_table(config: ActionConfig, strategy: AllocationStrategy, table: AllocationTable) -> Self {
        let mut allocator = Self {
            config,
            strategy,
            projected: AllocationTable::default(),
            table,
        };
        allocator.projected = allocator.compute();
        allocator
    }

    /// Current table
    pub fn table(&self) -> &AllocationTable {
        &self.table
    }

    /// Current config
    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Rebuild strategy
    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Swaps the config without touching the table
    pub fn replace_config(&mut self, config: ActionConfig) {
        self.config = config;
        self.projected = self.compute();
    }

    /// Recomputes the table from the current config
    ///
    /// Rebuilding twice with the same config yields the same table.
    pub fn rebuild(&mut self) -> &AllocationTable {
        self.table = self.compute();
        self.projected = self.table.clone();
        info!(
            "Allocated {} actions ({:?}, next position {})",
            self.table.len(),
            self.strategy,
            self.table.next_position()
        );
        &self.table
    }

    fn compute(&self) -> AllocationTable {
        match self.strategy {
            AllocationStrategy::ConfigOrder => AllocationTable::from_config(&self.config),
            AllocationStrategy::AppendOnly => AllocationTable::append_only(&self.config, &self.table),
        }
    }

    /// Resolves a slug to its bit position
    ///
    /// Lookup order: the current table, then a table recomputed from the
    /// current config, then the persisted mask of the action when exactly
    /// one bit is set. Anything else is unresolvable.
    pub fn resolve(&self, slug: &str, persisted: Option<&Bitmask>) -> Option<BitPosition> {
        if let Some(position) = self.table.position_of(slug) {
            return Some(position);
        }

        if let Some(position) = self.projected.position_of(slug) {
            debug!("Resolved '{}' from config after table miss", slug);
            return Some(position);
        }

        let position = persisted.and_then(Bitmask::single_bit_position);
        if position.is_some() {
            debug!("Resolved '{}' from its persisted single-bit mask", slug);
        }
        position
    }
}
