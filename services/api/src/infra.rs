use chrono::NaiveDate;
use hr_policy::error::AppError;
use hr_policy::policy::{
    ActorRole, FunctionalAreaCatalog, FunctionalAreaGate, InMemoryPolicyService,
    InMemoryStrategyRegistry, InMemorySwitchStore, PolicySeed, Principal, StaticSetIdResolver,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seed from `path`, the bundled demo tenant, or nothing at all.
pub(crate) fn load_seed(path: Option<&Path>, demo: bool) -> Result<PolicySeed, AppError> {
    match path {
        Some(path) => Ok(PolicySeed::load(path)?),
        None if demo => Ok(PolicySeed::demo()),
        None => Ok(PolicySeed::default()),
    }
}

/// In-process service with the standard catalog, rebuilt from `seed`.
pub(crate) fn build_policy_service(
    default_setid: &str,
    seed: &PolicySeed,
) -> Result<Arc<InMemoryPolicyService>, AppError> {
    let registry = Arc::new(InMemoryStrategyRegistry::new());
    let setids = Arc::new(StaticSetIdResolver::new(Some(default_setid.to_string())));
    let gate = FunctionalAreaGate::new(
        FunctionalAreaCatalog::standard(),
        Arc::new(InMemorySwitchStore::new()),
    );
    seed.apply(registry.as_ref(), &setids, &gate)?;
    Ok(Arc::new(InMemoryPolicyService::new(registry, gate, setids)))
}

/// Principal for command-line requests, standing in for the session gateway headers.
pub(crate) fn cli_principal(tenant_id: &str, role: &str, scope: Option<&str>) -> Principal {
    Principal {
        tenant_id: tenant_id.to_string(),
        actor_id: "cli".to_string(),
        role: ActorRole::parse(role),
        declared_scope: scope.map(str::to_string),
        request_id: Some(format!("cli-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
