use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value as JsonValue;

use crate::policy::domain::{ActorRole, PolicyItem, PolicyItemDraft, Principal};
use crate::policy::expression::{
    EvalContext, ExpressionEngine, ExpressionError, ExpressionEvaluator, Program, Value,
    ValueKind,
};
use crate::policy::functional_area::{
    FunctionalAreaCatalog, FunctionalAreaGate, FunctionalAreaSwitchStore, InMemorySwitchStore,
    SwitchStoreError,
};
use crate::policy::registry::{
    InMemoryStrategyRegistry, PolicySnapshot, RegistryError, StrategyRegistry, UpsertOutcome,
};
use crate::policy::service::FieldPolicyService;
use crate::policy::setid::StaticSetIdResolver;

pub(super) const TENANT: &str = "tenant-a";
pub(super) const CAPABILITY: &str = "staffing.assignment_create.field_policy";
pub(super) const FIELD: &str = "employment_type";
pub(super) const BU_PRIMARY: &str = "10000001";
pub(super) const BU_OTHER: &str = "10000002";
pub(super) const AS_OF: &str = "2026-03-01";

pub(super) fn tenant_draft(field_key: &str) -> PolicyItemDraft {
    PolicyItemDraft {
        capability_key: CAPABILITY.to_string(),
        owner_module: "staffing".to_string(),
        field_key: field_key.to_string(),
        personalization_mode: "tenant_only".to_string(),
        org_level: "tenant".to_string(),
        visible: true,
        default_value: "full_time".to_string(),
        priority: 100,
        effective_date: "2026-01-01".to_string(),
        ..PolicyItemDraft::default()
    }
}

pub(super) fn business_unit_draft(field_key: &str, business_unit_id: &str) -> PolicyItemDraft {
    PolicyItemDraft {
        personalization_mode: "setid".to_string(),
        org_level: "business_unit".to_string(),
        business_unit_id: business_unit_id.to_string(),
        explain_required: true,
        default_value: String::new(),
        default_rule_ref: format!("rule://staffing/{field_key}/{business_unit_id}"),
        ..tenant_draft(field_key)
    }
}

/// Validated item for resolver tests that bypass the registry.
pub(super) fn item(draft: PolicyItemDraft) -> PolicyItem {
    crate::policy::guard::PolicyGuard
        .item_from_draft(draft, chrono::Utc::now())
        .expect("fixture draft is valid")
}

pub(super) fn principal(role: &str) -> Principal {
    Principal {
        tenant_id: TENANT.to_string(),
        actor_id: "actor-42".to_string(),
        role: ActorRole::parse(role),
        declared_scope: None,
        request_id: Some("req-header".to_string()),
    }
}

pub(super) fn tenant_admin() -> Principal {
    principal("tenant_admin")
}

pub(super) fn hr_partner() -> Principal {
    principal("hr_partner")
}

pub(super) type TestService =
    FieldPolicyService<InMemoryStrategyRegistry, InMemorySwitchStore, StaticSetIdResolver>;

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) registry: Arc<InMemoryStrategyRegistry>,
    pub(super) switches: Arc<InMemorySwitchStore>,
    pub(super) setids: Arc<StaticSetIdResolver>,
}

pub(super) fn build_service() -> Harness {
    let registry = Arc::new(InMemoryStrategyRegistry::new());
    let switches = Arc::new(InMemorySwitchStore::new());
    let setids = Arc::new(StaticSetIdResolver::new(Some("DEFLT".to_string())));
    setids
        .insert(TENANT, BU_PRIMARY, "S2601")
        .expect("setid mapping stored");
    let gate = FunctionalAreaGate::new(FunctionalAreaCatalog::standard(), switches.clone());
    let service = FieldPolicyService::new(registry.clone(), gate, setids.clone());
    Harness {
        service,
        registry,
        switches,
        setids,
    }
}

/// Scenario data: a BU override that requires the field and a visible tenant default.
pub(super) fn seed_required_override(registry: &InMemoryStrategyRegistry) {
    let mut override_draft = business_unit_draft(FIELD, BU_PRIMARY);
    override_draft.required = true;
    override_draft.priority = 200;
    registry
        .upsert(TENANT, override_draft)
        .expect("bu item accepted");
    registry
        .upsert(TENANT, tenant_draft(FIELD))
        .expect("tenant item accepted");
}

pub(super) fn seed_hidden_override(registry: &InMemoryStrategyRegistry) {
    let mut hidden = business_unit_draft(FIELD, BU_PRIMARY);
    hidden.visible = false;
    hidden.priority = 300;
    registry.upsert(TENANT, hidden).expect("hidden item accepted");
}

pub(super) struct FailingSwitchStore;

impl FunctionalAreaSwitchStore for FailingSwitchStore {
    fn is_enabled(&self, _tenant_id: &str, _area_key: &str) -> Result<bool, SwitchStoreError> {
        Err(SwitchStoreError::Unavailable("switch backend offline".to_string()))
    }

    fn set_enabled(
        &self,
        _tenant_id: &str,
        _area_key: &str,
        _enabled: bool,
    ) -> Result<(), SwitchStoreError> {
        Err(SwitchStoreError::Unavailable("switch backend offline".to_string()))
    }
}

pub(super) struct UnavailableRegistry;

impl StrategyRegistry for UnavailableRegistry {
    fn upsert(
        &self,
        _tenant_id: &str,
        _draft: PolicyItemDraft,
    ) -> Result<UpsertOutcome, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }

    fn list(
        &self,
        _tenant_id: &str,
        _capability_key: Option<&str>,
        _field_key: Option<&str>,
        _as_of: &str,
    ) -> Result<Vec<PolicyItem>, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }

    fn snapshot(
        &self,
        _tenant_id: &str,
        _capability_key: Option<&str>,
        _field_key: Option<&str>,
        _as_of: &str,
    ) -> Result<PolicySnapshot, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }

    fn revision(&self, _tenant_id: &str) -> Result<u64, RegistryError> {
        Err(RegistryError::Unavailable("registry offline".to_string()))
    }
}

/// Engine returning canned values per source text and counting compilations.
#[derive(Default)]
pub(super) struct FakeEngine {
    pub(super) programs: HashMap<String, Result<Value, ExpressionError>>,
    pub(super) compiles: AtomicUsize,
    pub(super) compiled_sources: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub(super) fn with(mut self, source: &str, outcome: Result<Value, ExpressionError>) -> Self {
        self.programs.insert(source.to_string(), outcome);
        self
    }

    pub(super) fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

struct CannedProgram(Result<Value, ExpressionError>);

impl Program for CannedProgram {
    fn eval(&self, _ctx: &EvalContext) -> Result<Value, ExpressionError> {
        self.0.clone()
    }
}

impl ExpressionEngine for FakeEngine {
    fn compile(
        &self,
        source: &str,
        _output: ValueKind,
    ) -> Result<Arc<dyn Program>, ExpressionError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.compiled_sources
            .lock()
            .expect("sources mutex poisoned")
            .push(source.to_string());
        match self.programs.get(source) {
            Some(outcome) => Ok(Arc::new(CannedProgram(outcome.clone()))),
            None => Err(ExpressionError::Compile(format!("unknown source {source}"))),
        }
    }
}

pub(super) fn fake_evaluator(engine: Arc<FakeEngine>) -> ExpressionEvaluator {
    ExpressionEvaluator::new(engine)
}

pub(super) fn eval_context(business_unit_id: &str) -> EvalContext {
    EvalContext::from([
        ("tenant_id".to_string(), TENANT.to_string()),
        ("business_unit_id".to_string(), business_unit_id.to_string()),
    ])
}

pub(super) async fn read_json_body(response: Response) -> JsonValue {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
