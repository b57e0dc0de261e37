//! Slug -> bit position table

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::config::ActionConfig;
use crate::bitmask::{BitPosition, Bitmask};

/// One allocated action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedAction {
    /// Full slug, `{category}.{key}`
    pub slug: String,

    /// Category name
    pub category: String,

    /// Key within the category
    pub key: String,

    /// Allocated bit
    pub bit_position: BitPosition,

    /// Description from the config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AllocatedAction {
    /// `1 << bit_position`
    pub fn bitmask(&self) -> Bitmask {
        Bitmask::from_bit(self.bit_position)
    }

    /// Decimal form of the bitmask
    pub fn bitmask_string(&self) -> String {
        self.bitmask().to_decimal_string()
    }

    /// Hex form of the bitmask
    pub fn hex(&self) -> String {
        self.bitmask().to_hex_string()
    }
}

/// A slug whose persisted position disagrees with the allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDrift {
    /// Action slug
    pub slug: String,
    /// Position found in storage
    pub persisted: BitPosition,
    /// Position in the table, `None` if the slug is no longer allocated
    pub allocated: Option<BitPosition>,
}

/// Immutable allocation result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocationTable {
    /// Allocated actions ordered by bit position
    actions: Vec<AllocatedAction>,

    /// slug -> index into `actions`
    #[serde(skip)]
    index: HashMap<String, usize>,

    /// Positions of slugs that left the config; never handed out again
    retired: BTreeMap<String, BitPosition>,

    /// Next position an append-only rebuild would assign
    next_position: BitPosition,
}

impl AllocationTable {
    /// Walks categories then keys in declaration order with one counter
    pub fn from_config(config: &ActionConfig) -> Self {
        let actions = config
            .leaves()
            .enumerate()
            .map(|(position, (category, key, descriptor))| AllocatedAction {
                slug: format!("{}.{}", category, key),
                category: category.to_string(),
                key: key.to_string(),
                bit_position: position as BitPosition,
                description: descriptor.description.clone(),
            })
            .collect();

        Self::assemble(actions, BTreeMap::new())
    }

    /// Keeps every position `previous` ever assigned and appends new slugs
    ///
    /// Slugs that disappeared from the config are retired; their positions
    /// are not reused, so masks persisted before the change stay correct.
    pub fn append_only(config: &ActionConfig, previous: &AllocationTable) -> Self {
        let mut next = previous.next_position;
        let mut retired = previous.retired.clone();
        let mut actions = Vec::with_capacity(config.len());

        for (category, key, descriptor) in config.leaves() {
            let slug = format!("{}.{}", category, key);
            let bit_position = match previous
                .position_of(&slug)
                .or_else(|| retired.remove(&slug))
            {
                Some(position) => position,
                None => {
                    let position = next;
                    next += 1;
                    position
                }
            };

            actions.push(AllocatedAction {
                slug,
                category: category.to_string(),
                key: key.to_string(),
                bit_position,
                description: descriptor.description.clone(),
            });
        }

        for action in &previous.actions {
            if !actions.iter().any(|a| a.slug == action.slug) {
                retired.insert(action.slug.clone(), action.bit_position);
            }
        }

        let mut table = Self::assemble(actions, retired);
        table.next_position = table.next_position.max(next);
        table
    }

    /// Reconstructs a table from persisted `(slug, position)` pairs
    ///
    /// `retired` carries the positions of slugs that left the config, so the
    /// next append-only rebuild keeps them reserved.
    pub fn from_persisted<I, R>(entries: I, retired: R) -> Self
    where
        I: IntoIterator<Item = (String, BitPosition)>,
        R: IntoIterator<Item = (String, BitPosition)>,
    {
        let actions = entries
            .into_iter()
            .map(|(slug, bit_position)| {
                let (category, key) = match slug.split_once('.') {
                    Some((category, key)) => (category.to_string(), key.to_string()),
                    None => (slug.clone(), String::new()),
                };
                AllocatedAction {
                    slug,
                    category,
                    key,
                    bit_position,
                    description: None,
                }
            })
            .collect();

        Self::assemble(actions, retired.into_iter().collect())
    }

    fn assemble(mut actions: Vec<AllocatedAction>, retired: BTreeMap<String, BitPosition>) -> Self {
        actions.sort_by_key(|a| a.bit_position);

        let index = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.slug.clone(), i))
            .collect();

        let next_position = actions
            .iter()
            .map(|a| a.bit_position + 1)
            .chain(retired.values().map(|p| p + 1))
            .max()
            .unwrap_or(0);

        Self {
            actions,
            index,
            retired,
            next_position,
        }
    }

    /// Bit position of a slug
    pub fn position_of(&self, slug: &str) -> Option<BitPosition> {
        self.get(slug).map(|a| a.bit_position)
    }

    /// Allocated action by slug
    pub fn get(&self, slug: &str) -> Option<&AllocatedAction> {
        self.index.get(slug).and_then(|&i| self.actions.get(i))
    }

    /// Allocated actions ordered by bit position
    pub fn actions(&self) -> &[AllocatedAction] {
        &self.actions
    }

    /// Retired slugs and the positions they keep reserved
    pub fn retired(&self) -> &BTreeMap<String, BitPosition> {
        &self.retired
    }

    /// Next position an append-only rebuild would hand out
    pub fn next_position(&self) -> BitPosition {
        self.next_position
    }

    /// Number of allocated actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is allocated
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// OR of the bitmasks of the given slugs; unknown slugs are skipped
    pub fn combined_mask<'a, I>(&self, slugs: I) -> Bitmask
    where
        I: IntoIterator<Item = &'a str>,
    {
        Bitmask::from_indices(slugs.into_iter().filter_map(|slug| self.position_of(slug)))
    }

    /// Compares persisted positions against this table
    pub fn detect_drift(&self, persisted: &HashMap<String, BitPosition>) -> Vec<PositionDrift> {
        let mut drift: Vec<PositionDrift> = persisted
            .iter()
            .filter_map(|(slug, &position)| {
                let allocated = self.position_of(slug);
                if allocated == Some(position) {
                    None
                } else {
                    Some(PositionDrift {
                        slug: slug.clone(),
                        persisted: position,
                        allocated,
                    })
                }
            })
            .collect();
        drift.sort_by(|a, b| a.slug.cmp(&b.slug));
        drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ActionConfig {
        ActionConfig::new()
            .with_category("users", ["view", "create"])
            .with_category("posts", ["view"])
    }

    #[test]
    fn test_positions_follow_declaration_order() {
        let table = AllocationTable::from_config(&config());

        assert_eq!(table.position_of("users.view"), Some(0));
        assert_eq!(table.position_of("users.create"), Some(1));
        assert_eq!(table.position_of("posts.view"), Some(2));
        assert_eq!(table.position_of("posts.create"), None);

        let posts_view = table.get("posts.view").unwrap();
        assert_eq!(posts_view.bitmask_string(), "4");
        assert_eq!(posts_view.hex(), "4");
        assert_eq!(table.next_position(), 3);
    }

    #[test]
    fn test_combined_mask() {
        let table = AllocationTable::from_config(&config());
        let mask = table.combined_mask(["users.view", "posts.view", "nope.nope"]);
        assert_eq!(mask.to_string(), "5");
    }

    #[test]
    fn test_append_only_survives_reordering() {
        let original = AllocationTable::from_config(&config());

        let reordered = ActionConfig::new()
            .with_category("posts", ["view", "delete"])
            .with_category("users", ["view"]);
        let table = AllocationTable::append_only(&reordered, &original);

        assert_eq!(table.position_of("posts.view"), Some(2));
        assert_eq!(table.position_of("users.view"), Some(0));
        // new slug appended after everything ever used
        assert_eq!(table.position_of("posts.delete"), Some(3));
        // removed slug keeps its slot reserved
        assert_eq!(table.retired().get("users.create"), Some(&1));
        assert_eq!(table.position_of("users.create"), None);

        // re-adding a retired slug restores its old position
        let readded = AllocationTable::append_only(&config(), &table);
        assert_eq!(readded.position_of("users.create"), Some(1));
        assert!(readded.retired().get("users.create").is_none());
        assert_eq!(readded.retired().get("posts.delete"), Some(&3));
    }

    #[test]
    fn test_append_only_is_idempotent() {
        let base = AllocationTable::from_config(&config());
        let once = AllocationTable::append_only(&config(), &base);
        let twice = AllocationTable::append_only(&config(), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_detect_drift_after_reordering() {
        let reordered = ActionConfig::new()
            .with_category("posts", ["view"])
            .with_category("users", ["view", "create"]);
        let table = AllocationTable::from_config(&reordered);

        let persisted: HashMap<String, BitPosition> = [
            ("users.view".to_string(), 0),
            ("users.create".to_string(), 1),
            ("posts.view".to_string(), 2),
            ("gone.action".to_string(), 7),
        ]
        .into_iter()
        .collect();

        let drift = table.detect_drift(&persisted);
        let slugs: Vec<_> = drift.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["gone.action", "posts.view", "users.create", "users.view"]);
        assert_eq!(drift[0].allocated, None);
        assert_eq!(drift[1].allocated, Some(0));
    }

    #[test]
    fn test_from_persisted() {
        let table = AllocationTable::from_persisted(
            vec![("users.create".to_string(), 4), ("users.view".to_string(), 1)],
            Vec::new(),
        );
        assert_eq!(table.actions()[0].slug, "users.view");
        assert_eq!(table.get("users.create").unwrap().key, "create");
        assert_eq!(table.next_position(), 5);
    }

    #[test]
    fn test_from_persisted_keeps_retired_reserved() {
        let table = AllocationTable::from_persisted(
            vec![("users.view".to_string(), 0), ("users.create".to_string(), 1)],
            vec![("posts.view".to_string(), 2)],
        );
        assert_eq!(table.next_position(), 3);
        assert_eq!(table.retired().get("posts.view"), Some(&2));

        let grown = ActionConfig::new()
            .with_category("users", ["view", "create"])
            .with_category("comments", ["view"]);
        let next = AllocationTable::append_only(&grown, &table);
        assert_eq!(next.position_of("comments.view"), Some(3));
        assert_eq!(next.retired().get("posts.view"), Some(&2));
    }
}
