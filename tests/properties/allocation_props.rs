use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use splitlab::core::allocator::allocate;
use splitlab::core::model::Variant;
use splitlab::test_utils::fixtures::{FixedRng, variant};

fn variants_strategy() -> impl Strategy<Value = Vec<Variant>> {
    prop::collection::vec(0.0f64..100.0, 1..6).prop_map(|weights| {
        weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| variant("exp", &format!("v{i}"), w, i == 0))
            .collect()
    })
}

proptest! {
    #[test]
    fn draw_always_lands_on_positive_weight(
        variants in variants_strategy(),
        seed in any::<u64>(),
    ) {
        prop_assume!(variants.iter().any(|v| v.traffic_allocation_percent > 0.0));
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..16 {
            let chosen = allocate(&variants, &mut rng).unwrap();
            prop_assert!(chosen.traffic_allocation_percent > 0.0);
            prop_assert!(variants.iter().any(|v| v.id == chosen.id));
        }
    }

    #[test]
    fn draw_ignores_storage_order(
        variants in variants_strategy(),
        bits in any::<u64>(),
    ) {
        prop_assume!(variants.iter().any(|v| v.traffic_allocation_percent > 0.0));
        let mut reversed = variants.clone();
        reversed.reverse();
        let a = allocate(&variants, &mut FixedRng(bits)).unwrap();
        let b = allocate(&reversed, &mut FixedRng(bits)).unwrap();
        prop_assert_eq!(&a.id, &b.id);
    }

    #[test]
    fn all_zero_weights_are_rejected(count in 1usize..5) {
        let variants: Vec<Variant> = (0..count)
            .map(|i| variant("exp", &format!("v{i}"), 0.0, i == 0))
            .collect();
        prop_assert!(allocate(&variants, &mut FixedRng::low()).is_err());
    }
}
