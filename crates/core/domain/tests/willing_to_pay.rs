use domain::{RequirementFilter, WillingToPay};

#[test]
fn wire_values_map_to_tri_state() {
    assert_eq!(WillingToPay::from_wire(None), WillingToPay::Unset);
    assert_eq!(WillingToPay::from_wire(Some(0)), WillingToPay::No);
    assert_eq!(WillingToPay::from_wire(Some(1)), WillingToPay::Yes);
    assert_eq!(WillingToPay::from_wire(Some(7)), WillingToPay::Unset);
}

#[test]
fn wire_round_trip_preserves_state() {
    for state in [WillingToPay::Unset, WillingToPay::No, WillingToPay::Yes] {
        assert_eq!(WillingToPay::from_wire(state.as_wire()), state);
        assert_eq!(WillingToPay::from_db(state.as_db()), state);
    }
}

#[test]
fn unset_maps_to_null_columns() {
    assert_eq!(WillingToPay::Unset.as_db(), None);
    assert_eq!(WillingToPay::Unset.as_wire(), None);
    assert_eq!(WillingToPay::from_db(None), WillingToPay::Unset);
}

#[test]
fn filter_two_selects_only_unset() {
    let filter = RequirementFilter::from_query(Some(2));
    assert!(filter.matches(WillingToPay::Unset));
    assert!(!filter.matches(WillingToPay::No));
    assert!(!filter.matches(WillingToPay::Yes));
}

#[test]
fn unknown_filter_value_means_no_filter() {
    let filter = RequirementFilter::from_query(Some(9));
    assert_eq!(filter, RequirementFilter::Any);
    assert!(filter.matches(WillingToPay::Unset));
    assert!(filter.matches(WillingToPay::Yes));
}
