use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hr_policy::policy::seed::DEMO_TENANT;
use hr_policy::policy::{
    policy_router, FunctionalAreaCatalog, FunctionalAreaGate, InMemoryPolicyService,
    InMemoryStrategyRegistry, InMemorySwitchStore, PolicySeed, StaticSetIdResolver,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const CAPABILITY: &str = "staffing.assignment_create.field_policy";

fn demo_router() -> Router {
    let registry = Arc::new(InMemoryStrategyRegistry::new());
    let setids = Arc::new(StaticSetIdResolver::new(Some("DEFLT".to_string())));
    let gate = FunctionalAreaGate::new(
        FunctionalAreaCatalog::standard(),
        Arc::new(InMemorySwitchStore::new()),
    );
    PolicySeed::demo()
        .apply(registry.as_ref(), &setids, &gate)
        .expect("demo seed applies");
    let service: InMemoryPolicyService = InMemoryPolicyService::new(registry, gate, setids);
    policy_router(Arc::new(service))
}

async fn explain(
    router: Router,
    role: &str,
    scope: Option<&str>,
    field_key: &str,
    business_unit_id: &str,
) -> (StatusCode, Value) {
    let mut builder = Request::get(format!(
        "/internal/setid-explain?capability_key={CAPABILITY}&field_key={field_key}&business_unit_id={business_unit_id}&as_of=2026-03-01"
    ))
    .header("x-tenant-id", DEMO_TENANT)
    .header("x-actor-id", "actor-7")
    .header("x-actor-role", role)
    .header("x-request-id", "req-scenario");
    if let Some(scope) = scope {
        builder = builder.header("x-actor-scope", scope);
    }

    let response = router
        .oneshot(builder.body(Body::empty()).expect("request builds"))
        .await
        .expect("route executes");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&body).expect("json payload"))
}

#[tokio::test]
async fn business_unit_override_makes_field_required() {
    let (status, payload) =
        explain(demo_router(), "hr_partner", None, "employment_type", "10000001").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["decision"]["required"], json!(true));
    assert_eq!(payload["decision"]["visible"], json!(true));
    assert_eq!(
        payload["decision"]["reason_code"],
        json!("FIELD_REQUIRED_IN_CONTEXT")
    );
    assert_eq!(payload["setid"], json!("S2601"));
    assert_eq!(payload["request_id"], json!("req-scenario"));
}

#[tokio::test]
async fn other_business_unit_gets_tenant_default() {
    let (status, payload) =
        explain(demo_router(), "hr_partner", None, "employment_type", "10000002").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["decision"]["required"], json!(false));
    assert_eq!(
        payload["decision"]["resolved_default_value"],
        json!("full_time")
    );
    assert_eq!(payload["setid"], json!("DEFLT"));
}

#[tokio::test]
async fn hidden_override_denies_field() {
    let (status, payload) =
        explain(demo_router(), "hr_partner", None, "cost_center", "10000001").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["decision"]["visible"], json!(false));
    assert_eq!(payload["decision"]["decision"], json!("deny"));
    assert_eq!(
        payload["decision"]["reason_code"],
        json!("FIELD_HIDDEN_IN_CONTEXT")
    );
}

#[tokio::test]
async fn unknown_field_reports_missing_policy() {
    let (status, payload) =
        explain(demo_router(), "hr_partner", None, "work_location", "10000001").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(payload["code"], json!("FIELD_POLICY_MISSING"));
}

#[tokio::test]
async fn tenant_admin_claiming_saas_scope_is_rejected() {
    let (status, payload) = explain(
        demo_router(),
        "tenant_admin",
        Some("saas"),
        "employment_type",
        "10000001",
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["code"], json!("CAPABILITY_CONTEXT_MISMATCH"));
}

#[tokio::test]
async fn superadmin_saas_scope_is_accepted() {
    let (status, _) = explain(
        demo_router(),
        "superadmin",
        Some("saas"),
        "employment_type",
        "10000001",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}
