use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::policy::domain::{OrgLevel, DEFAULT_CHANGE_POLICY, DEFAULT_PRIORITY};
use crate::policy::guard::{DraftField, PolicyViolation};
use crate::policy::registry::{InMemoryStrategyRegistry, RegistryError, StrategyRegistry};

#[test]
fn upsert_appends_then_replaces_on_natural_key() {
    let registry = InMemoryStrategyRegistry::new();

    let created = registry
        .upsert(TENANT, tenant_draft(FIELD))
        .expect("first upsert");
    assert!(!created.updated);

    let mut changed = tenant_draft(FIELD);
    changed.default_value = "part_time".to_string();
    let replaced = registry.upsert(TENANT, changed).expect("second upsert");
    assert!(replaced.updated);

    let items = registry
        .list(TENANT, Some(CAPABILITY), Some(FIELD), AS_OF)
        .expect("list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].default_value, "part_time");
    assert_eq!(registry.revision(TENANT).expect("revision"), 2);
}

#[test]
fn snapshot_revision_matches_its_items_under_concurrent_upserts() {
    let registry = Arc::new(InMemoryStrategyRegistry::new());
    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for index in 0..200 {
                registry
                    .upsert(TENANT, tenant_draft(&format!("field_{index}")))
                    .expect("accepted");
            }
        })
    };

    // Every upsert adds a distinct field, so revision and item count move together.
    for _ in 0..200 {
        let snapshot = registry
            .snapshot(TENANT, Some(CAPABILITY), None, AS_OF)
            .expect("snapshot");
        assert_eq!(snapshot.revision, snapshot.items.len() as u64);
    }
    writer.join().expect("writer finishes");

    let snapshot = registry
        .snapshot(TENANT, Some(CAPABILITY), Some("field_7"), AS_OF)
        .expect("snapshot");
    assert_eq!(snapshot.revision, 200);
    assert_eq!(snapshot.items.len(), 1);
}

#[test]
fn identical_upsert_is_idempotent() {
    let registry = InMemoryStrategyRegistry::new();
    registry.upsert(TENANT, tenant_draft(FIELD)).expect("first");
    let again = registry.upsert(TENANT, tenant_draft(FIELD)).expect("second");

    assert!(again.updated);
    assert_eq!(registry.len(TENANT).expect("len"), 1);
}

#[test]
fn upsert_applies_defaults_and_normalizes_keys() {
    let registry = InMemoryStrategyRegistry::new();
    let mut draft = tenant_draft("  Employment_Type ");
    draft.capability_key = " STAFFING.Assignment_Create.Field_Policy".to_string();
    draft.priority = 0;
    draft.business_unit_id = "10000001".to_string();

    let saved = registry.upsert(TENANT, draft).expect("accepted").item;
    assert_eq!(saved.capability_key, CAPABILITY);
    assert_eq!(saved.field_key, FIELD);
    assert_eq!(saved.priority, DEFAULT_PRIORITY);
    assert_eq!(saved.change_policy, DEFAULT_CHANGE_POLICY);
    assert_eq!(saved.org_level, OrgLevel::Tenant);
    assert!(saved.business_unit_id.is_empty(), "tenant items drop the bu id");
}

#[test]
fn items_are_listed_in_natural_key_order() {
    let registry = InMemoryStrategyRegistry::new();
    registry
        .upsert(TENANT, tenant_draft("work_location"))
        .expect("accepted");
    registry
        .upsert(TENANT, business_unit_draft("cost_center", BU_OTHER))
        .expect("accepted");
    registry
        .upsert(TENANT, tenant_draft("cost_center"))
        .expect("accepted");

    let keys: Vec<String> = registry
        .list(TENANT, None, None, AS_OF)
        .expect("list")
        .iter()
        .map(|item| item.natural_key())
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 3);
}

#[test]
fn list_applies_the_effective_window() {
    let registry = InMemoryStrategyRegistry::new();
    let mut bounded = tenant_draft(FIELD);
    bounded.end_date = Some("2026-03-01".to_string());
    registry.upsert(TENANT, bounded).expect("bounded");
    let mut future = tenant_draft(FIELD);
    future.effective_date = "2026-03-01".to_string();
    registry.upsert(TENANT, future).expect("future");

    let before = registry
        .list(TENANT, Some(CAPABILITY), Some(FIELD), "2026-02-28")
        .expect("list");
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].end_date.map(|d| d.to_string()).as_deref(), Some("2026-03-01"));

    let on_boundary = registry
        .list(TENANT, Some(CAPABILITY), Some(FIELD), "2026-03-01")
        .expect("list");
    assert_eq!(on_boundary.len(), 1, "end_date is exclusive, effective_date inclusive");
    assert!(on_boundary[0].end_date.is_none());

    let before_start = registry
        .list(TENANT, Some(CAPABILITY), Some(FIELD), "2025-12-31")
        .expect("list");
    assert!(before_start.is_empty());
}

#[test]
fn tenants_are_isolated() {
    let registry = InMemoryStrategyRegistry::new();
    registry.upsert(TENANT, tenant_draft(FIELD)).expect("accepted");

    let other = registry
        .list("tenant-b", Some(CAPABILITY), Some(FIELD), AS_OF)
        .expect("list");
    assert!(other.is_empty());
    assert_eq!(registry.revision("tenant-b").expect("revision"), 0);
}

#[test]
fn list_rejects_malformed_as_of() {
    let registry = InMemoryStrategyRegistry::new();
    match registry.list(TENANT, None, None, "03/01/2026") {
        Err(RegistryError::InvalidAsOf(raw)) => assert_eq!(raw, "03/01/2026"),
        other => panic!("expected invalid as_of, got {other:?}"),
    }
}

#[test]
fn reset_clears_every_tenant() {
    let registry = InMemoryStrategyRegistry::new();
    registry.upsert(TENANT, tenant_draft(FIELD)).expect("accepted");
    registry.upsert("tenant-b", tenant_draft(FIELD)).expect("accepted");

    registry.reset().expect("reset");
    assert_eq!(registry.len(TENANT).expect("len"), 0);
    assert_eq!(registry.len("tenant-b").expect("len"), 0);
}

#[test]
fn blank_tenant_is_rejected() {
    let registry = InMemoryStrategyRegistry::new();
    assert!(matches!(
        registry.upsert("  ", tenant_draft(FIELD)),
        Err(RegistryError::TenantRequired)
    ));
}

fn violation(draft: crate::policy::domain::PolicyItemDraft) -> PolicyViolation {
    match InMemoryStrategyRegistry::new().upsert(TENANT, draft) {
        Err(RegistryError::Invalid(violation)) => violation,
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn validation_reports_distinct_codes() {
    let mut missing_owner = tenant_draft(FIELD);
    missing_owner.owner_module = " ".to_string();
    assert_eq!(
        violation(missing_owner),
        PolicyViolation::Missing(DraftField::OwnerModule)
    );

    let mut single_segment = tenant_draft(FIELD);
    single_segment.capability_key = "staffing".to_string();
    assert_eq!(violation(single_segment).code(), "invalid_capability_key");

    let mut dashed_field = tenant_draft(FIELD);
    dashed_field.field_key = "employment-type".to_string();
    assert_eq!(violation(dashed_field).code(), "invalid_field_key");

    let mut bad_mode = tenant_draft(FIELD);
    bad_mode.personalization_mode = "global".to_string();
    assert_eq!(violation(bad_mode).code(), "invalid_personalization_mode");

    let mut bad_level = tenant_draft(FIELD);
    bad_level.org_level = "department".to_string();
    assert_eq!(violation(bad_level).code(), "invalid_org_level");

    assert_eq!(
        violation(business_unit_draft(FIELD, "1234")).code(),
        "invalid_business_unit_id"
    );

    let mut package = tenant_draft(FIELD);
    package.personalization_mode = "scope_package".to_string();
    package.explain_required = true;
    assert_eq!(violation(package), PolicyViolation::ScopeCodeRequired);

    let mut unexplained = business_unit_draft(FIELD, BU_PRIMARY);
    unexplained.explain_required = false;
    assert_eq!(violation(unexplained).code(), "EXPLAIN_REQUIRED");

    let mut hidden_required = tenant_draft(FIELD);
    hidden_required.required = true;
    hidden_required.visible = false;
    assert_eq!(violation(hidden_required).code(), "FIELD_POLICY_CONFLICT");

    let mut bad_date = tenant_draft(FIELD);
    bad_date.effective_date = "2026-13-01".to_string();
    assert_eq!(violation(bad_date).code(), "invalid_effective_date");

    let mut inverted = tenant_draft(FIELD);
    inverted.end_date = Some("2026-01-01".to_string());
    assert_eq!(violation(inverted), PolicyViolation::EndDateNotAfterEffective);
}
