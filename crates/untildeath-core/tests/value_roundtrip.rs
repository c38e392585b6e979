//! Property-based coverage for the canonical `stringify`/`truthy` rules
//! spec'd for every primitive value, run over randomized inputs rather than
//! a handful of hand-picked examples.

use proptest::prelude::*;
use untildeath_core::value::Value;

proptest! {
    #[test]
    fn int_stringifies_as_decimal(i: i64) {
        prop_assert_eq!(Value::Int(i).stringify(), i.to_string());
    }

    #[test]
    fn bool_stringifies_as_alive_or_dead(b: bool) {
        let expected = if b { "ALIVE" } else { "DEAD" };
        prop_assert_eq!(Value::Bool(b).stringify(), expected);
    }

    #[test]
    fn finite_float_always_prints_a_decimal_point(f in -1.0e12f64..1.0e12f64) {
        prop_assume!(f.is_finite());
        let s = Value::Float(f).stringify();
        prop_assert!(s.contains('.'));
    }

    #[test]
    fn nonzero_int_is_truthy(i in any::<i64>().prop_filter("nonzero", |i| *i != 0)) {
        prop_assert!(Value::Int(i).truthy());
    }

    #[test]
    fn string_truthiness_matches_emptiness(s: String) {
        prop_assert_eq!(Value::str(s.clone()).truthy(), !s.is_empty());
    }

    #[test]
    fn array_equality_is_reflexive(xs in prop::collection::vec(any::<i64>(), 0..8)) {
        let values: Vec<Value> = xs.iter().map(|i| Value::Int(*i)).collect();
        let a = Value::array(values.clone());
        let b = Value::array(values);
        prop_assert!(a.equals(&b));
    }
}
