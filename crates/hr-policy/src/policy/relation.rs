use super::domain::{is_business_unit_id, parse_iso_date, ActorRole};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationError {
    #[error("actor does not manage org unit '{0}'")]
    NotManaged(String),
}

/// Org units the actor manages, computed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicRelations {
    /// Elevated roles manage every org unit of the tenant.
    All,
    /// Other roles manage only the preloaded business unit.
    BusinessUnit(String),
    /// Nothing was preloaded; every check fails.
    None,
}

pub fn preload_dynamic_relations(
    role: &ActorRole,
    business_unit_id: Option<&str>,
) -> DynamicRelations {
    if role.is_elevated() {
        return DynamicRelations::All;
    }
    match business_unit_id.map(str::trim) {
        Some(id) if is_business_unit_id(id) => DynamicRelations::BusinessUnit(id.to_string()),
        _ => DynamicRelations::None,
    }
}

impl DynamicRelations {
    /// Whether the actor manages `target_org_unit_id` on `as_of`. Malformed input is a no.
    pub fn manages(&self, target_org_unit_id: &str, as_of: &str) -> bool {
        let target = target_org_unit_id.trim();
        if !is_business_unit_id(target) || parse_iso_date(as_of).is_none() {
            return false;
        }
        match self {
            Self::All => true,
            Self::BusinessUnit(id) => id == target,
            Self::None => false,
        }
    }

    pub fn require(&self, target_org_unit_id: &str, as_of: &str) -> Result<(), RelationError> {
        if self.manages(target_org_unit_id, as_of) {
            Ok(())
        } else {
            Err(RelationError::NotManaged(target_org_unit_id.trim().to_string()))
        }
    }
}
