//! Tests for the property store and its change notifications

mod common;

use blockflow::{
    custom_property_type, BlockFlowError, ChangeEvent, Direction, PropertyContainer,
    RuntimeContext, Value, ValueKind,
};
use common::test_timeout;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Calibration {
    gain: f64,
    offset: f64,
}

custom_property_type!(Calibration);

fn container(name: &str) -> PropertyContainer {
    PropertyContainer::new(&RuntimeContext::standalone(), name)
}

proptest! {
    #[test]
    fn prop_int_round_trip(initial in any::<i32>(), next in any::<i32>()) {
        let c = container("store");
        c.add_property("n", Direction::Input, initial, "").unwrap();
        prop_assert_eq!(c.property_value::<i32>("n").unwrap(), initial);
        c.set_property_value("n", next).unwrap();
        prop_assert_eq!(c.property_value::<i32>("n").unwrap(), next);
    }

    #[test]
    fn prop_double_round_trip(v in prop::num::f64::NORMAL | prop::num::f64::ZERO) {
        let c = container("store");
        c.add_property("d", Direction::Output, 0.0f64, "").unwrap();
        c.set_property_value("d", v).unwrap();
        prop_assert_eq!(c.property_value::<f64>("d").unwrap(), v);
    }

    #[test]
    fn prop_text_round_trip(s in ".*") {
        let c = container("store");
        c.add_property("t", Direction::Input, String::new(), "").unwrap();
        c.set_property_value("t", s.clone()).unwrap();
        prop_assert_eq!(c.property_value::<String>("t").unwrap(), s);
    }

    #[test]
    fn prop_range_enforced(v in -100i32..100) {
        let c = container("store");
        c.add_ranged_property("level", Direction::Input, 0i32, -10, 10, "").unwrap();
        let result = c.set_property_value("level", v);
        if (-10..=10).contains(&v) {
            prop_assert!(result.is_ok());
            prop_assert_eq!(c.property_value::<i32>("level").unwrap(), v);
        } else {
            let is_out_of_range = matches!(result, Err(BlockFlowError::OutOfRange { .. }));
            prop_assert!(is_out_of_range);
            prop_assert_eq!(c.property_value::<i32>("level").unwrap(), 0);
        }
    }

    #[test]
    fn prop_declaration_order_kept(names in prop::collection::hash_set("[a-z]{1,8}", 1..16)) {
        let c = container("store");
        let names: Vec<String> = names.into_iter().collect();
        for name in &names {
            c.add_property(name, Direction::Input, true, "").unwrap();
        }
        prop_assert_eq!(c.property_names(), names);
    }
}

#[test]
fn test_type_mismatch_leaves_value() {
    let c = container("store");
    c.add_property("n", Direction::Input, 4i32, "").unwrap();
    assert!(matches!(
        c.set_property_value("n", 1.5f64),
        Err(BlockFlowError::TypeMismatch { .. })
    ));
    assert!(matches!(
        c.property_value::<bool>("n"),
        Err(BlockFlowError::TypeMismatch { .. })
    ));
    assert_eq!(c.property_value::<i32>("n").unwrap(), 4);
}

#[test]
fn test_duplicate_and_missing_names() {
    let c = container("store");
    c.add_property("n", Direction::Input, 0i32, "").unwrap();
    assert!(matches!(
        c.add_property("n", Direction::Output, 0.0f64, ""),
        Err(BlockFlowError::DuplicateName { .. })
    ));
    assert!(matches!(
        c.property_value::<i32>("missing"),
        Err(BlockFlowError::NotFound(_))
    ));
    c.remove_property("n").unwrap();
    assert!(!c.contains_property("n"));
    c.add_property("n", Direction::Output, 0.0f64, "").unwrap();
    assert_eq!(c.property_kind("n").unwrap(), ValueKind::Double);
}

#[test]
fn test_custom_values_are_shared() {
    let c = container("store");
    let calibration = Calibration {
        gain: 2.0,
        offset: -1.0,
    };
    c.add_property("calibration", Direction::Output, calibration.clone(), "")
        .unwrap();
    assert_eq!(c.property_value::<Calibration>("calibration").unwrap(), calibration);
    assert!(matches!(
        c.property_kind("calibration").unwrap(),
        ValueKind::Custom(_)
    ));
    assert!(c.help_text().is_empty());
}

#[test]
fn test_value_changes_are_published() {
    let ctx = RuntimeContext::standalone();
    let c = PropertyContainer::new(&ctx, "store");
    let global = ctx.notifier().subscribe();
    let local = c.subscribe();

    c.add_property("n", Direction::Input, 0i32, "").unwrap();
    c.set_property_value("n", 3i32).unwrap();
    c.set_name("renamed").unwrap();

    let expected_value = ChangeEvent::PropertyValueChanged {
        container: c.id(),
        name: "store".to_string(),
        property: "n".to_string(),
        value: Value::Int(3),
    };
    let local_events = local.drain();
    assert_eq!(local_events.len(), 3);
    assert!(matches!(local_events[0], ChangeEvent::PropertyAdded { .. }));
    assert_eq!(local_events[1], expected_value);
    assert!(matches!(local_events[2], ChangeEvent::NameChanged { ref name, .. } if name == "renamed"));

    assert_eq!(global.recv_timeout(test_timeout()).map(|e| e.container()), Some(c.id()));
    assert_eq!(global.pending(), 2);
}

#[test]
fn test_destroy_is_terminal() {
    let c = container("store");
    let events = c.subscribe();
    c.add_property("n", Direction::Input, 0i32, "").unwrap();
    c.destroy();

    assert!(c.is_destroyed());
    assert!(c.set_property_value("n", 1i32).is_err());
    let events = events.drain();
    assert!(matches!(events.last(), Some(ChangeEvent::ContainerDestroyed { .. })));
}
