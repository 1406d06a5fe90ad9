use super::domain::{
    Decision, FieldDecision, OrgLevel, PolicyItem, FIELD_DEFAULT_RULE_MISSING,
    FIELD_POLICY_CONFLICT, FIELD_POLICY_MISSING, FIELD_REQUIRED_IN_CONTEXT,
};
use super::registry::{RegistryError, StrategyRegistry};

/// Context for a single field decision.
#[derive(Debug, Clone, Copy)]
pub struct FieldDecisionQuery<'a> {
    pub tenant_id: &'a str,
    pub capability_key: &'a str,
    pub field_key: &'a str,
    pub business_unit_id: &'a str,
    pub as_of: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum FieldPolicyError {
    #[error("no field policy applies to {capability_key}/{field_key}")]
    Missing {
        capability_key: String,
        field_key: String,
    },
    #[error("field policy {rule_id} is required but hidden")]
    Conflict { rule_id: String },
    #[error("field policy {rule_id} has no default rule or value")]
    DefaultRuleMissing { rule_id: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FieldPolicyError {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Missing { .. } => Some(FIELD_POLICY_MISSING),
            Self::Conflict { .. } => Some(FIELD_POLICY_CONFLICT),
            Self::DefaultRuleMissing { .. } => Some(FIELD_DEFAULT_RULE_MISSING),
            Self::Registry(_) => None,
        }
    }
}

/// Ranks how narrowly `item` targets the caller. `None` excludes the item.
pub fn specificity(item: &PolicyItem, business_unit_id: &str) -> Option<u8> {
    let business_unit_id = business_unit_id.trim();
    if !business_unit_id.is_empty()
        && item
            .business_unit_id
            .eq_ignore_ascii_case(business_unit_id)
    {
        return Some(2);
    }
    match item.org_level {
        OrgLevel::Tenant => Some(1),
        OrgLevel::BusinessUnit => None,
    }
}

/// Winner among `items` by specificity, then priority, then effective date.
/// Ties keep the earlier item.
pub fn select_field_policy<'a>(
    items: &'a [PolicyItem],
    business_unit_id: &str,
) -> Option<&'a PolicyItem> {
    let mut winner: Option<(u8, &PolicyItem)> = None;
    for item in items {
        let Some(rank) = specificity(item, business_unit_id) else {
            continue;
        };
        let replace = match winner {
            None => true,
            Some((best_rank, best)) => {
                rank > best_rank
                    || (rank == best_rank && item.priority > best.priority)
                    || (rank == best_rank
                        && item.priority == best.priority
                        && item.effective_date > best.effective_date)
            }
        };
        if replace {
            winner = Some((rank, item));
        }
    }
    winner.map(|(_, item)| item)
}

/// Decide a field from an already-listed snapshot.
pub fn decide_field(
    items: &[PolicyItem],
    capability_key: &str,
    field_key: &str,
    business_unit_id: &str,
) -> Result<FieldDecision, FieldPolicyError> {
    let winner =
        select_field_policy(items, business_unit_id).ok_or_else(|| FieldPolicyError::Missing {
            capability_key: capability_key.to_string(),
            field_key: field_key.to_string(),
        })?;

    // Seeded data can bypass write validation.
    if winner.is_conflicting() {
        return Err(FieldPolicyError::Conflict {
            rule_id: winner.natural_key(),
        });
    }
    if !winner.has_default() {
        return Err(FieldPolicyError::DefaultRuleMissing {
            rule_id: winner.natural_key(),
        });
    }

    Ok(FieldDecision {
        capability_key: winner.capability_key.clone(),
        field_key: winner.field_key.clone(),
        required: winner.required,
        visible: winner.visible,
        default_rule_ref: winner.default_rule_ref.clone(),
        resolved_default_value: winner.default_value.clone(),
        decision: Decision::Allow,
        reason_code: winner
            .required
            .then(|| FIELD_REQUIRED_IN_CONTEXT.to_string()),
    })
}

pub fn resolve_field_decision<R>(
    registry: &R,
    query: &FieldDecisionQuery<'_>,
) -> Result<FieldDecision, FieldPolicyError>
where
    R: StrategyRegistry + ?Sized,
{
    let items = registry.list(
        query.tenant_id,
        Some(query.capability_key),
        Some(query.field_key),
        query.as_of,
    )?;
    decide_field(
        &items,
        query.capability_key,
        query.field_key,
        query.business_unit_id,
    )
}
