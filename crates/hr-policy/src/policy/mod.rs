//! Field-level capability policy engine.
//!
//! Versioned policy items live in a per-tenant [`StrategyRegistry`]. A request passes the
//! capability context check and the functional area gate, has its business unit mapped to
//! a setid, and is then answered either by the specificity resolver (explain) or by
//! expression-based rule candidates (internal evaluate).

pub mod capability;
pub mod domain;
pub mod explain;
pub mod expression;
pub mod functional_area;
pub mod guard;
pub mod registry;
pub mod relation;
pub mod resolver;
pub mod router;
pub mod rules;
pub mod seed;
pub mod service;
pub mod setid;

#[cfg(test)]
mod tests;

pub use capability::{
    check_actor_scope, resolve_capability_context, ActorScope, CapabilityContext,
    CapabilityContextError, CapabilityContextInput,
};
pub use domain::{
    ActorRole, Decision, FieldDecision, OrgLevel, PersonalizationMode, PolicyItem,
    PolicyItemDraft, Principal,
};
pub use explain::{ExplainLevel, ExplainRequest, ExplainResponse, FullExplainDetails};
pub use expression::{
    ContextExpressionEngine, EvalContext, ExpressionEngine, ExpressionError,
    ExpressionEvaluator, ExpressionSlot, Program, Value, ValueKind,
};
pub use functional_area::{
    AreaLifecycle, CapabilityDefinition, FunctionalAreaCatalog, FunctionalAreaError,
    FunctionalAreaGate, FunctionalAreaSwitchStore, InMemorySwitchStore, SwitchStoreError,
};
pub use guard::{PolicyGuard, PolicyViolation};
pub use registry::{
    InMemoryStrategyRegistry, PolicySnapshot, RegistryError, StrategyRegistry, UpsertOutcome,
};
pub use relation::{preload_dynamic_relations, DynamicRelations, RelationError};
pub use resolver::{
    decide_field, resolve_field_decision, select_field_policy, FieldDecisionQuery,
    FieldPolicyError,
};
pub use router::{policy_router, principal_from_headers, ApiError};
pub use rules::{
    build_rule_candidates, evaluate_rule_candidates, BriefExplain, RuleCandidate,
    RuleEvaluation, RuleEvaluationError,
};
pub use seed::{PolicySeed, SeedError, SeedSummary};
pub use service::{
    EvaluateRulesRequest, FieldPolicyService, FunctionalAreaSwitchRequest,
    FunctionalAreaSwitchState, ListPoliciesQuery, PolicyListing, PolicyServiceError,
    RuleEvaluationResponse, UpsertPolicyRequest,
};
pub use setid::{SetIdError, SetIdResolver, StaticSetIdResolver};

/// Service wired with the in-process adapters.
pub type InMemoryPolicyService =
    FieldPolicyService<InMemoryStrategyRegistry, InMemorySwitchStore, StaticSetIdResolver>;
