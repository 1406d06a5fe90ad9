use std::sync::Arc;

use super::common::*;
use crate::policy::functional_area::{
    AreaLifecycle, FunctionalAreaCatalog, FunctionalAreaError, FunctionalAreaGate,
    FunctionalAreaSwitchStore, InMemorySwitchStore, FUNCTIONAL_AREA_DISABLED,
    FUNCTIONAL_AREA_MISSING, FUNCTIONAL_AREA_NOT_ACTIVE,
};

fn gate() -> (FunctionalAreaGate<InMemorySwitchStore>, Arc<InMemorySwitchStore>) {
    let switches = Arc::new(InMemorySwitchStore::new());
    (
        FunctionalAreaGate::new(FunctionalAreaCatalog::standard(), switches.clone()),
        switches,
    )
}

#[test]
fn active_capability_passes_and_reports_its_area() {
    let (gate, _) = gate();
    let definition = gate.check(TENANT, CAPABILITY).expect("allowed");
    assert_eq!(definition.functional_area_key, "staffing");
    assert!(definition.business_unit_required);
}

#[test]
fn unknown_capability_is_missing() {
    let (gate, _) = gate();
    let err = gate
        .check(TENANT, "benefits.plan_enroll.field_policy")
        .expect_err("unknown capability");
    assert_eq!(err.code(), Some(FUNCTIONAL_AREA_MISSING));
}

#[test]
fn capability_of_unregistered_area_is_missing() {
    let switches = Arc::new(InMemorySwitchStore::new());
    let catalog = FunctionalAreaCatalog::new().with_capability(
        "benefits.plan_enroll.field_policy",
        "benefits",
        false,
    );
    let gate = FunctionalAreaGate::new(catalog, switches);
    assert!(matches!(
        gate.check(TENANT, "benefits.plan_enroll.field_policy"),
        Err(FunctionalAreaError::Missing(_))
    ));
}

#[test]
fn reserved_area_is_not_active() {
    let (gate, _) = gate();
    let err = gate
        .check(TENANT, "payroll.pay_group_assign.field_policy")
        .expect_err("reserved");
    assert_eq!(err.code(), Some(FUNCTIONAL_AREA_NOT_ACTIVE));
    assert_eq!(gate.catalog().area("payroll"), Some(AreaLifecycle::Reserved));
}

#[test]
fn tenant_switch_disables_area_idempotently() {
    let (gate, switches) = gate();
    gate.set_enabled(TENANT, "staffing", false).expect("disable");
    gate.set_enabled(TENANT, "staffing", false).expect("disable again");

    let err = gate.check(TENANT, CAPABILITY).expect_err("disabled");
    assert_eq!(err.code(), Some(FUNCTIONAL_AREA_DISABLED));
    assert!(gate.check("tenant-b", CAPABILITY).is_ok(), "other tenants unaffected");
    assert!(!switches.is_enabled(TENANT, "staffing").expect("store readable"));

    gate.set_enabled(TENANT, "staffing", true).expect("enable");
    assert!(gate.check(TENANT, CAPABILITY).is_ok());
}

#[test]
fn switching_unknown_area_is_rejected() {
    let (gate, _) = gate();
    assert!(matches!(
        gate.set_enabled(TENANT, "benefits", false),
        Err(FunctionalAreaError::Missing(_))
    ));
}

#[test]
fn store_failures_surface() {
    let gate = FunctionalAreaGate::new(
        FunctionalAreaCatalog::standard(),
        Arc::new(FailingSwitchStore),
    );
    let err = gate.check(TENANT, CAPABILITY).expect_err("store offline");
    assert!(matches!(err, FunctionalAreaError::Store(_)));
    assert_eq!(err.code(), None);
}
