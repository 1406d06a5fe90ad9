use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::capability::{
    check_actor_scope, resolve_capability_context, CapabilityContext, CapabilityContextError,
    CapabilityContextInput,
};
use super::domain::{non_blank, Decision, PolicyItem, PolicyItemDraft, Principal};
use super::explain::{
    ExplainLevel, ExplainRequest, ExplainResponse, FullExplainDetails,
};
use super::expression::{EvalContext, ExpressionEvaluator};
use super::functional_area::{
    FunctionalAreaError, FunctionalAreaGate, FunctionalAreaSwitchStore,
};
use super::guard::is_field_key;
use super::registry::{RegistryError, StrategyRegistry, UpsertOutcome};
use super::relation::{preload_dynamic_relations, RelationError};
use super::resolver::{decide_field, FieldPolicyError};
use super::rules::{
    build_rule_candidates, evaluate_rule_candidates, BriefExplain, RuleCandidate,
    RuleEvaluationError,
};
use super::setid::{SetIdError, SetIdResolver};

/// Authoring payload: a draft plus the mandatory audit request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertPolicyRequest {
    #[serde(flatten)]
    pub draft: PolicyItemDraft,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListPoliciesQuery {
    pub capability_key: Option<String>,
    pub field_key: Option<String>,
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyListing {
    pub as_of: String,
    pub items: Vec<PolicyItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluateRulesRequest {
    pub capability_key: Option<String>,
    pub field_key: Option<String>,
    pub business_unit_id: Option<String>,
    pub as_of: Option<String>,
    pub request_id: Option<String>,
    pub target_org_unit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEvaluationResponse {
    pub trace_id: String,
    pub request_id: String,
    pub capability_key: String,
    pub functional_area_key: String,
    pub field_key: String,
    pub setid: String,
    pub policy_version: String,
    pub decision: Decision,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_rule: Option<RuleCandidate>,
    pub brief_explain: BriefExplain,
    pub context: EvalContext,
    pub candidates_evaluated: usize,
    pub eligibility_matched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FunctionalAreaSwitchRequest {
    pub area_key: String,
    pub enabled: bool,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionalAreaSwitchState {
    pub tenant_id: String,
    pub area_key: String,
    pub enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("explain level full requires an elevated role")]
    ExplainLevelForbidden,
    #[error("role {0} may not change functional area switches")]
    RoleForbidden(String),
    #[error(transparent)]
    Context(#[from] CapabilityContextError),
    #[error("declared setid '{declared}' does not match resolved '{resolved}'")]
    SetIdMismatch { declared: String, resolved: String },
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    FunctionalArea(#[from] FunctionalAreaError),
    #[error(transparent)]
    SetId(#[from] SetIdError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    FieldPolicy(#[from] FieldPolicyError),
    #[error(transparent)]
    Rules(#[from] RuleEvaluationError),
}

/// Validated request context shared by explain and rule evaluation.
struct ResolvedRequest {
    context: CapabilityContext,
    field_key: String,
    functional_area_key: String,
    setid: String,
}

/// Composes the registry, gate, setid resolver, and expression evaluator.
pub struct FieldPolicyService<R, S, O> {
    registry: Arc<R>,
    gate: FunctionalAreaGate<S>,
    setids: Arc<O>,
    evaluator: ExpressionEvaluator,
}

impl<R, S, O> FieldPolicyService<R, S, O>
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    pub fn new(registry: Arc<R>, gate: FunctionalAreaGate<S>, setids: Arc<O>) -> Self {
        Self::with_evaluator(registry, gate, setids, ExpressionEvaluator::default())
    }

    pub fn with_evaluator(
        registry: Arc<R>,
        gate: FunctionalAreaGate<S>,
        setids: Arc<O>,
        evaluator: ExpressionEvaluator,
    ) -> Self {
        Self {
            registry,
            gate,
            setids,
            evaluator,
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn gate(&self) -> &FunctionalAreaGate<S> {
        &self.gate
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// Create or replace the item on its natural key.
    pub fn upsert_policy(
        &self,
        principal: &Principal,
        request: UpsertPolicyRequest,
    ) -> Result<UpsertOutcome, PolicyServiceError> {
        check_actor_scope(principal.declared_scope.as_deref(), &principal.role)?;
        if non_blank(request.request_id.as_deref()).is_none() {
            return Err(PolicyServiceError::InvalidRequest(
                "request_id is required".to_string(),
            ));
        }
        Ok(self.registry.upsert(&principal.tenant_id, request.draft)?)
    }

    pub fn list_policies(
        &self,
        principal: &Principal,
        query: ListPoliciesQuery,
    ) -> Result<PolicyListing, PolicyServiceError> {
        check_actor_scope(principal.declared_scope.as_deref(), &principal.role)?;
        let as_of = non_blank(query.as_of.as_deref())
            .ok_or_else(|| PolicyServiceError::InvalidRequest("as_of is required".to_string()))?
            .to_string();
        let items = self.registry.list(
            &principal.tenant_id,
            query.capability_key.as_deref(),
            query.field_key.as_deref(),
            &as_of,
        )?;
        Ok(PolicyListing { as_of, items })
    }

    /// Evaluate the capability's field through expression-based rule candidates.
    pub fn evaluate_rules(
        &self,
        principal: &Principal,
        request: EvaluateRulesRequest,
    ) -> Result<RuleEvaluationResponse, PolicyServiceError> {
        check_actor_scope(principal.declared_scope.as_deref(), &principal.role)?;
        let trace_id = Uuid::new_v4().to_string();
        let request_id = request_id(request.request_id.as_deref(), principal);
        let resolved = self.resolve_request(
            principal,
            request.capability_key.as_deref(),
            request.field_key.as_deref(),
            request.business_unit_id.as_deref(),
            request.as_of.as_deref(),
            request.target_org_unit_id.as_deref(),
        )?;
        let context = &resolved.context;
        let as_of = context.as_of.format("%Y-%m-%d").to_string();

        let snapshot = self.registry.snapshot(
            &principal.tenant_id,
            Some(&context.capability_key),
            Some(&resolved.field_key),
            &as_of,
        )?;
        let candidates = build_rule_candidates(&snapshot.items);

        let ctx = EvalContext::from([
            ("tenant_id".to_string(), principal.tenant_id.clone()),
            ("actor_id".to_string(), principal.actor_id.clone()),
            ("actor_role".to_string(), principal.role.as_str().to_string()),
            ("capability_key".to_string(), context.capability_key.clone()),
            ("field_key".to_string(), resolved.field_key.clone()),
            ("setid".to_string(), resolved.setid.clone()),
            (
                "business_unit_id".to_string(),
                context.business_unit_id.clone().unwrap_or_default(),
            ),
            ("as_of".to_string(), as_of),
            ("request_id".to_string(), request_id.clone()),
            ("trace_id".to_string(), trace_id.clone()),
        ]);

        let evaluation = evaluate_rule_candidates(&self.evaluator, &candidates, &ctx)?;
        debug!(
            %trace_id,
            capability_key = %context.capability_key,
            field_key = %resolved.field_key,
            decision = %evaluation.decision,
            matched = evaluation.eligibility_matched,
            "rule candidates evaluated"
        );

        let brief_explain = evaluation.brief_explain();
        Ok(RuleEvaluationResponse {
            trace_id,
            request_id,
            capability_key: context.capability_key.clone(),
            functional_area_key: resolved.functional_area_key,
            field_key: resolved.field_key,
            setid: resolved.setid,
            policy_version: policy_version(snapshot.revision),
            decision: evaluation.decision,
            reason_code: evaluation.reason_code,
            selected_rule_id: evaluation.selected.as_ref().map(|rule| rule.rule_id.clone()),
            selected_rule: evaluation.selected,
            brief_explain,
            context: ctx,
            candidates_evaluated: evaluation.candidates_evaluated,
            eligibility_matched: evaluation.eligibility_matched,
        })
    }

    /// Resolve one field decision and shape it for the requested explain level.
    pub fn explain(
        &self,
        principal: &Principal,
        request: ExplainRequest,
    ) -> Result<ExplainResponse, PolicyServiceError> {
        // Scope spoofing outranks every other rejection.
        check_actor_scope(principal.declared_scope.as_deref(), &principal.role)?;
        let level = ExplainLevel::parse(request.level.as_deref().unwrap_or_default())
            .ok_or_else(|| {
                PolicyServiceError::InvalidRequest("level must be brief or full".to_string())
            })?;
        if level == ExplainLevel::Full && !principal.role.is_elevated() {
            return Err(PolicyServiceError::ExplainLevelForbidden);
        }

        let resolved = self.resolve_request(
            principal,
            request.capability_key.as_deref(),
            request.field_key.as_deref(),
            request.business_unit_id.as_deref(),
            request.as_of.as_deref(),
            request.org_unit_id.as_deref(),
        )?;
        if let Some(declared) = non_blank(request.setid.as_deref()) {
            if !declared.eq_ignore_ascii_case(&resolved.setid) {
                return Err(PolicyServiceError::SetIdMismatch {
                    declared: declared.to_string(),
                    resolved: resolved.setid,
                });
            }
        }

        let context = resolved.context;
        let as_of = context.as_of.format("%Y-%m-%d").to_string();
        let snapshot = self.registry.snapshot(
            &principal.tenant_id,
            Some(&context.capability_key),
            Some(&resolved.field_key),
            &as_of,
        )?;
        let policy_version = policy_version(snapshot.revision);
        let mut items = snapshot.items;
        if let Some(scope_code) = non_blank(request.scope_code.as_deref()) {
            items.retain(|item| {
                item.scope_code.is_empty() || item.scope_code.eq_ignore_ascii_case(scope_code)
            });
        }

        let decision = decide_field(
            &items,
            &context.capability_key,
            &resolved.field_key,
            context.business_unit_id.as_deref().unwrap_or_default(),
        )?
        .with_visibility_applied();

        let full = (level == ExplainLevel::Full).then(|| FullExplainDetails {
            tenant_id: principal.tenant_id.clone(),
            business_unit_id: context.business_unit_id.clone(),
            org_unit_id: non_blank(request.org_unit_id.as_deref()).map(str::to_string),
            resolved_config_version: format!("{}:{}", resolved.setid, policy_version),
        });

        Ok(ExplainResponse {
            level,
            trace_id: Uuid::new_v4().to_string(),
            request_id: request_id(request.request_id.as_deref(), principal),
            capability_key: context.capability_key,
            field_key: resolved.field_key,
            functional_area_key: resolved.functional_area_key,
            setid: resolved.setid,
            as_of,
            policy_version,
            decision,
            full,
        })
    }

    /// Enable or disable a functional area for the caller's tenant.
    pub fn set_functional_area(
        &self,
        principal: &Principal,
        request: FunctionalAreaSwitchRequest,
    ) -> Result<FunctionalAreaSwitchState, PolicyServiceError> {
        check_actor_scope(principal.declared_scope.as_deref(), &principal.role)?;
        if !principal.role.is_elevated() {
            return Err(PolicyServiceError::RoleForbidden(
                principal.role.as_str().to_string(),
            ));
        }
        if non_blank(request.request_id.as_deref()).is_none() {
            return Err(PolicyServiceError::InvalidRequest(
                "request_id is required".to_string(),
            ));
        }
        let area_key = non_blank(Some(request.area_key.as_str()))
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| PolicyServiceError::InvalidRequest("area_key is required".to_string()))?;

        self.gate
            .set_enabled(&principal.tenant_id, &area_key, request.enabled)?;
        Ok(FunctionalAreaSwitchState {
            tenant_id: principal.tenant_id.clone(),
            area_key,
            enabled: request.enabled,
        })
    }

    fn resolve_request(
        &self,
        principal: &Principal,
        capability_key: Option<&str>,
        field_key: Option<&str>,
        business_unit_id: Option<&str>,
        as_of: Option<&str>,
        target_org_unit_id: Option<&str>,
    ) -> Result<ResolvedRequest, PolicyServiceError> {
        let business_unit_required = non_blank(capability_key)
            .map(|key| {
                self.gate
                    .catalog()
                    .business_unit_required(&key.to_ascii_lowercase())
            })
            .unwrap_or(false);
        let context = resolve_capability_context(
            CapabilityContextInput {
                capability_key,
                business_unit_id,
                as_of,
                declared_scope: principal.declared_scope.as_deref(),
            },
            &principal.role,
            business_unit_required,
        )?;

        let field_key = non_blank(field_key)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| PolicyServiceError::InvalidRequest("field_key is required".to_string()))?;
        if !is_field_key(&field_key) {
            return Err(PolicyServiceError::InvalidRequest(format!(
                "field_key '{field_key}' is not a lower_snake identifier"
            )));
        }

        let functional_area_key = self
            .gate
            .check(&principal.tenant_id, &context.capability_key)?
            .functional_area_key
            .clone();

        if let Some(target) = non_blank(target_org_unit_id) {
            let as_of = context.as_of.format("%Y-%m-%d").to_string();
            preload_dynamic_relations(&principal.role, context.business_unit_id.as_deref())
                .require(target, &as_of)?;
        }

        let setid = self.setids.resolve_setid(
            &principal.tenant_id,
            context.business_unit_id.as_deref(),
            context.as_of,
        )?;

        Ok(ResolvedRequest {
            context,
            field_key,
            functional_area_key,
            setid,
        })
    }
}

fn policy_version(revision: u64) -> String {
    format!("v{revision}")
}

fn request_id(body: Option<&str>, principal: &Principal) -> String {
    non_blank(body)
        .or_else(|| non_blank(principal.request_id.as_deref()))
        .unwrap_or_default()
        .to_string()
}
