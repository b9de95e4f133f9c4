//! Property-based tests for determinism guarantees

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use wedge::axis::{expand, AxisSpec, AxisTarget};
use wedge::combination::CombinationPlan;
use wedge::error::ConfigError;
use wedge::naming::output_name;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-5i64..5).prop_map(Value::from),
        (-5i64..5).prop_map(|n| json!(n as f64)),
        (-50i64..50).prop_map(|n| json!(n as f64 / 4.0)),
        any::<bool>().prop_map(Value::from),
        prop::sample::select(vec!["1", "3", "true", "false", "2.5", "euler"])
            .prop_map(Value::from),
    ]
}

fn explicit_axes(lengths: &[usize]) -> Vec<AxisSpec> {
    lengths
        .iter()
        .enumerate()
        .map(|(axis, &len)| {
            let values = (0..len).map(|v| json!(v)).collect();
            AxisSpec::explicit(AxisTarget::new(format!("Node{}", axis), "p"), values).unwrap()
        })
        .collect()
}

/// Enumerating the same plan twice yields the same sequence.
#[test]
fn test_enumeration_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(1usize..5, 0..4), |lengths| {
            let plan = CombinationPlan::new(&explicit_axes(&lengths), None).unwrap();
            let first: Vec<_> = plan.iter().collect();
            let second: Vec<_> = plan.iter().collect();
            assert_eq!(first, second);
            Ok(())
        })
        .unwrap();
}

proptest! {
    #[test]
    fn product_size_matches_axis_lengths(lengths in prop::collection::vec(1usize..6, 0..4)) {
        let plan = CombinationPlan::new(&explicit_axes(&lengths), None).unwrap();
        let expected: usize = lengths.iter().product();
        prop_assert_eq!(plan.total(), expected);
        prop_assert_eq!(plan.iter().count(), expected);
    }

    #[test]
    fn limit_caps_enumeration(
        lengths in prop::collection::vec(1usize..6, 1..4),
        limit in 1usize..200,
    ) {
        let plan = CombinationPlan::new(&explicit_axes(&lengths), Some(limit)).unwrap();
        let total: usize = lengths.iter().product();
        let combos: Vec<_> = plan.iter().collect();
        prop_assert_eq!(combos.len(), limit.min(total));
        let indices: Vec<usize> = combos.iter().map(|c| c.index).collect();
        prop_assert_eq!(indices, (1..=limit.min(total)).collect::<Vec<_>>());
    }

    #[test]
    fn explicit_values_are_returned_verbatim(values in prop::collection::vec(any::<i64>(), 1..20)) {
        let values: Vec<Value> = values.into_iter().map(Value::from).collect();
        let spec = AxisSpec::explicit(AxisTarget::new("N", "p"), values.clone()).unwrap();
        prop_assert_eq!(expand(&spec).unwrap(), values);
    }

    #[test]
    fn integer_range_count(min in -100i64..100, span in 0i64..200, step in 1i64..10) {
        let max = min + span;
        let spec = AxisSpec::min_max(AxisTarget::new("N", "p"), min as f64, max as f64, step as f64).unwrap();
        let values = expand(&spec).unwrap();
        prop_assert_eq!(values.len() as i64, span / step + 1);
        prop_assert_eq!(values.first(), Some(&json!(min)));
        prop_assert!(values.iter().all(|v| v.as_i64().map_or(false, |n| n <= max)));
    }

    #[test]
    fn names_are_injective_over_string_values(
        texts in prop::collection::hash_set(any::<String>(), 1..12),
    ) {
        let values: Vec<Value> = texts.into_iter().map(Value::from).collect();
        let spec = AxisSpec::explicit(AxisTarget::new("CLIPTextEncode", "text"), values).unwrap();
        let plan = CombinationPlan::new(&[spec], None).unwrap();
        let names: Vec<String> = plan.iter().map(|c| output_name(&c, "wedge")).collect();
        let unique: HashSet<&String> = names.iter().collect();
        prop_assert_eq!(unique.len(), names.len());
        prop_assert!(names.iter().all(|n| !n.contains('/')));
    }

    /// Mixed scalar axes either load with distinct names or are refused at load.
    #[test]
    fn names_are_injective_over_mixed_scalars(values in prop::collection::vec(scalar(), 1..12)) {
        match AxisSpec::explicit(AxisTarget::new("KSampler", "seed"), values) {
            Ok(spec) => {
                let plan = CombinationPlan::new(&[spec], None).unwrap();
                let names: Vec<String> = plan.iter().map(|c| output_name(&c, "w")).collect();
                let unique: HashSet<&String> = names.iter().collect();
                prop_assert_eq!(unique.len(), names.len());
            }
            Err(err) => prop_assert!(
                matches!(err, ConfigError::InvalidAxis { .. }),
                "unexpected error {}",
                err
            ),
        }
    }
}
