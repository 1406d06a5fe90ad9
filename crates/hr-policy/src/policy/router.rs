use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::capability::{check_actor_scope, CapabilityContextError, CAPABILITY_CONTEXT_MISMATCH};
use super::domain::{ActorRole, Principal, EXPLAIN_REQUIRED, FIELD_POLICY_CONFLICT};
use super::explain::{ExplainRequest, EXPLAIN_LEVEL_FORBIDDEN};
use super::functional_area::FunctionalAreaSwitchStore;
use super::guard::PolicyViolation;
use super::registry::{RegistryError, StrategyRegistry};
use super::resolver::FieldPolicyError;
use super::service::{
    EvaluateRulesRequest, FieldPolicyService, FunctionalAreaSwitchRequest, ListPoliciesQuery,
    PolicyServiceError, UpsertPolicyRequest,
};
use super::setid::{SetIdError, SetIdResolver, SETID_NOT_RESOLVED};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const ROLE_HEADER: &str = "x-actor-role";
pub const SCOPE_HEADER: &str = "x-actor-scope";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const PRINCIPAL_REQUIRED: &str = "PRINCIPAL_REQUIRED";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const ACTOR_ROLE_FORBIDDEN: &str = "ACTOR_ROLE_FORBIDDEN";

/// Internal endpoints for field policy evaluation, authoring, and explain.
pub fn policy_router<R, S, O>(service: Arc<FieldPolicyService<R, S, O>>) -> Router
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    Router::new()
        .route("/internal/rules/evaluate", post(evaluate_handler::<R, S, O>))
        .route(
            "/internal/setid-strategy-registry",
            get(list_handler::<R, S, O>).post(upsert_handler::<R, S, O>),
        )
        .route("/internal/setid-explain", get(explain_handler::<R, S, O>))
        .route(
            "/internal/functional-area-switches",
            put(switch_handler::<R, S, O>),
        )
        .with_state(service)
}

/// Error body shared by every policy endpoint: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    /// Details go to the log; callers only see the generic code.
    fn internal(detail: &dyn std::error::Error) -> Self {
        error!(error = %detail, "policy request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, INTERNAL_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({
            "code": self.code,
            "message": self.message,
        });
        (self.status, Json(payload)).into_response()
    }
}

impl From<PolicyServiceError> for ApiError {
    fn from(err: PolicyServiceError) -> Self {
        match err {
            PolicyServiceError::InvalidRequest(message) => {
                Self::bad_request(INVALID_REQUEST, message)
            }
            PolicyServiceError::ExplainLevelForbidden => {
                Self::forbidden(EXPLAIN_LEVEL_FORBIDDEN, err.to_string())
            }
            PolicyServiceError::RoleForbidden(_) => {
                Self::forbidden(ACTOR_ROLE_FORBIDDEN, err.to_string())
            }
            PolicyServiceError::Context(context) => match context {
                CapabilityContextError::Mismatch { .. } => {
                    Self::forbidden(context.code(), context.to_string())
                }
                other => Self::bad_request(other.code(), other.to_string()),
            },
            PolicyServiceError::SetIdMismatch { .. } | PolicyServiceError::Relation(_) => {
                Self::forbidden(CAPABILITY_CONTEXT_MISMATCH, err.to_string())
            }
            PolicyServiceError::FunctionalArea(gate) => match gate.code() {
                Some(code) => Self::forbidden(code, gate.to_string()),
                None => Self::internal(&gate),
            },
            PolicyServiceError::SetId(setid) => match setid {
                SetIdError::NotFound(_) => {
                    Self::unprocessable(SETID_NOT_RESOLVED, setid.to_string())
                }
                SetIdError::Unavailable(_) => Self::internal(&setid),
            },
            PolicyServiceError::Registry(registry) => registry_error(registry),
            PolicyServiceError::FieldPolicy(policy) => match policy {
                FieldPolicyError::Registry(registry) => registry_error(registry),
                FieldPolicyError::Conflict { .. } => {
                    Self::new(StatusCode::CONFLICT, FIELD_POLICY_CONFLICT, policy.to_string())
                }
                FieldPolicyError::Missing { .. } | FieldPolicyError::DefaultRuleMissing { .. } => {
                    let code = policy.code().unwrap_or(INTERNAL_ERROR);
                    Self::unprocessable(code, policy.to_string())
                }
            },
            PolicyServiceError::Rules(rules) => Self::internal(&rules),
        }
    }
}

fn registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::TenantRequired => ApiError::new(
            StatusCode::UNAUTHORIZED,
            PRINCIPAL_REQUIRED,
            err.to_string(),
        ),
        RegistryError::Invalid(violation) => match violation {
            PolicyViolation::ExplainRequired(_) => {
                ApiError::unprocessable(EXPLAIN_REQUIRED, violation.to_string())
            }
            PolicyViolation::RequiredButHidden => ApiError::new(
                StatusCode::CONFLICT,
                FIELD_POLICY_CONFLICT,
                violation.to_string(),
            ),
            other => ApiError::bad_request(other.code(), other.to_string()),
        },
        RegistryError::InvalidAsOf(_) => ApiError::bad_request("invalid_as_of", err.to_string()),
        RegistryError::Unavailable(_) => ApiError::internal(&err),
    }
}

/// Principal asserted by the session gateway. Tenant, actor, and role are mandatory.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let required = |name: &str| {
        header_value(headers, name).ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                PRINCIPAL_REQUIRED,
                format!("{name} header is required"),
            )
        })
    };

    Ok(Principal {
        tenant_id: required(TENANT_HEADER)?,
        actor_id: required(ACTOR_HEADER)?,
        role: ActorRole::parse(&required(ROLE_HEADER)?),
        // Undecodable scope values stay present so the scope check rejects them.
        declared_scope: headers
            .get(SCOPE_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
            .filter(|value| !value.is_empty()),
        request_id: header_value(headers, REQUEST_ID_HEADER),
    })
}

/// Gateway principal whose declared scope matches its role. Runs before the body or
/// query is inspected, so a spoofed scope is never reported as a malformed request.
fn scoped_principal(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let principal = principal_from_headers(headers)?;
    check_actor_scope(principal.declared_scope.as_deref(), &principal.role)
        .map_err(|err| ApiError::from(PolicyServiceError::from(err)))?;
    Ok(principal)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request(INVALID_REQUEST, rejection.body_text())
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::bad_request(INVALID_REQUEST, rejection.body_text())
}

pub(crate) async fn evaluate_handler<R, S, O>(
    State(service): State<Arc<FieldPolicyService<R, S, O>>>,
    headers: HeaderMap,
    payload: Result<Json<EvaluateRulesRequest>, JsonRejection>,
) -> Response
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    let result = scoped_principal(&headers).and_then(|principal| {
        let Json(request) = payload.map_err(json_rejection)?;
        service
            .evaluate_rules(&principal, request)
            .map_err(ApiError::from)
    });
    match result {
        Ok(evaluation) => (StatusCode::OK, Json(evaluation)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<R, S, O>(
    State(service): State<Arc<FieldPolicyService<R, S, O>>>,
    headers: HeaderMap,
    query: Result<Query<ListPoliciesQuery>, QueryRejection>,
) -> Response
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    let result = scoped_principal(&headers).and_then(|principal| {
        let Query(query) = query.map_err(query_rejection)?;
        service
            .list_policies(&principal, query)
            .map_err(ApiError::from)
    });
    match result {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn upsert_handler<R, S, O>(
    State(service): State<Arc<FieldPolicyService<R, S, O>>>,
    headers: HeaderMap,
    payload: Result<Json<UpsertPolicyRequest>, JsonRejection>,
) -> Response
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    let result = scoped_principal(&headers).and_then(|principal| {
        let Json(request) = payload.map_err(json_rejection)?;
        service
            .upsert_policy(&principal, request)
            .map_err(ApiError::from)
    });
    match result {
        Ok(outcome) => {
            let status = if outcome.updated {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(outcome.item)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn explain_handler<R, S, O>(
    State(service): State<Arc<FieldPolicyService<R, S, O>>>,
    headers: HeaderMap,
    query: Result<Query<ExplainRequest>, QueryRejection>,
) -> Response
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    let result = scoped_principal(&headers).and_then(|principal| {
        let Query(request) = query.map_err(query_rejection)?;
        service.explain(&principal, request).map_err(ApiError::from)
    });
    match result {
        Ok(explain) => (StatusCode::OK, Json(explain)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn switch_handler<R, S, O>(
    State(service): State<Arc<FieldPolicyService<R, S, O>>>,
    headers: HeaderMap,
    payload: Result<Json<FunctionalAreaSwitchRequest>, JsonRejection>,
) -> Response
where
    R: StrategyRegistry + 'static,
    S: FunctionalAreaSwitchStore + 'static,
    O: SetIdResolver + 'static,
{
    let result = scoped_principal(&headers).and_then(|principal| {
        let Json(request) = payload.map_err(json_rejection)?;
        service
            .set_functional_area(&principal, request)
            .map_err(ApiError::from)
    });
    match result {
        Ok(state) => (StatusCode::OK, Json(state)).into_response(),
        Err(err) => err.into_response(),
    }
}
