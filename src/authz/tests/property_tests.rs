//! Property tests for bitmask algebra and storage

use permask_authz::{
    ActionConfig, Bitmask, BitmaskRepository, EntityRef, InMemoryPermissionStore, SparseConfig,
    SparseOptimizer, StorageMode,
};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use std::sync::Arc;

fn positions() -> impl Strategy<Value = Vec<u32>> {
    vec(0u32..20_000, 0..40)
}

proptest! {
    #[test]
    fn indices_round_trip(positions in positions()) {
        let mask = Bitmask::from_indices(positions.iter().copied());
        let rebuilt = Bitmask::from_indices(mask.to_indices());
        prop_assert_eq!(&rebuilt, &mask);

        let reparsed = Bitmask::parse(&mask.to_decimal_string()).unwrap();
        prop_assert_eq!(reparsed, mask);
    }

    #[test]
    fn decimal_round_trip_for_any_u128(value in any::<u128>()) {
        let decimal = value.to_string();
        let mask = Bitmask::parse(&decimal).unwrap();
        prop_assert_eq!(Bitmask::from_indices(mask.to_indices()).to_string(), decimal);
    }

    #[test]
    fn combine_only_adds_bits(a in positions(), b in positions()) {
        let left = Bitmask::from_indices(a.iter().copied());
        let right = Bitmask::from_indices(b.iter().copied());
        let combined = Bitmask::combine([&left, &right]);

        prop_assert!(combined.has_all_bits(&left));
        prop_assert!(combined.has_all_bits(&right));
        for position in a.iter().chain(b.iter()) {
            prop_assert!(combined.has_bit(*position));
        }
        prop_assert!(combined.bit_count() >= left.bit_count().max(right.bit_count()));
    }

    #[test]
    fn compress_is_lossless(positions in btree_set(0u32..20_000, 0..64)) {
        let optimizer = SparseOptimizer::default();
        let mask = Bitmask::from_indices(positions.iter().copied());

        let compressed = optimizer.compress(&mask);
        prop_assert_eq!(compressed.clone(), positions.into_iter().collect::<Vec<_>>());
        prop_assert_eq!(optimizer.decompress(&compressed), mask.clone());
        prop_assert_eq!(optimizer.restore(&optimizer.optimize(&mask)), mask);
    }

    #[test]
    fn repository_hides_representation(positions in positions()) {
        let mask = Bitmask::from_indices(positions.iter().copied());
        let owner = EntityRef::role("prop");

        let reads: Vec<String> = [StorageMode::Dense, StorageMode::Sparse, StorageMode::Auto]
            .into_iter()
            .map(|mode| {
                let repository = BitmaskRepository::new(
                    Arc::new(InMemoryPermissionStore::new()),
                    SparseOptimizer::new(SparseConfig { mode, ..Default::default() }),
                );
                tokio_test::block_on(async {
                    repository.set_bitmask(&owner, &mask).await.unwrap();
                    repository.get_bitmask(&owner).await.unwrap().to_string()
                })
            })
            .collect();

        for read in &reads {
            prop_assert_eq!(read, &mask.to_string());
        }
    }

    #[test]
    fn allocation_is_deterministic(keys in btree_set("[a-z]{1,6}", 1..10)) {
        let config = ActionConfig::new()
            .with_category("first", keys.iter().cloned())
            .with_category("second", keys.iter().cloned());

        let a = permask_authz::AllocationTable::from_config(&config);
        let b = permask_authz::AllocationTable::from_config(&config);
        prop_assert_eq!(&a, &b);

        let positions: Vec<u32> = a.actions().iter().map(|action| action.bit_position).collect();
        let expected: Vec<u32> = (0..(keys.len() * 2) as u32).collect();
        prop_assert_eq!(positions, expected);
    }
}
