use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{is_business_unit_id, non_blank, parse_iso_date, ActorRole};

pub const CAPABILITY_CONTEXT_REQUIRED: &str = "CAPABILITY_CONTEXT_REQUIRED";
pub const CAPABILITY_CONTEXT_MISMATCH: &str = "CAPABILITY_CONTEXT_MISMATCH";

/// Which plane an actor operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorScope {
    Saas,
    Tenant,
}

impl ActorScope {
    /// Server-side scope for a role. Only superadmins act at the SaaS level.
    pub fn for_role(role: &ActorRole) -> Self {
        if role.is_superadmin() {
            Self::Saas
        } else {
            Self::Tenant
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "saas" => Some(Self::Saas),
            "tenant" => Some(Self::Tenant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saas => "saas",
            Self::Tenant => "tenant",
        }
    }
}

impl fmt::Display for ActorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability context as declared by the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityContextInput<'a> {
    pub capability_key: Option<&'a str>,
    pub business_unit_id: Option<&'a str>,
    pub as_of: Option<&'a str>,
    pub declared_scope: Option<&'a str>,
}

/// Normalized, validated capability context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityContext {
    pub capability_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_unit_id: Option<String>,
    pub as_of: NaiveDate,
    pub actor_scope: ActorScope,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityContextError {
    #[error("capability context field {field} is required")]
    Required { field: &'static str },
    #[error("as_of '{0}' is not a YYYY-MM-DD date")]
    InvalidAsOf(String),
    #[error("business_unit_id '{0}' must be an 8-digit id")]
    InvalidBusinessUnit(String),
    #[error("declared actor scope '{declared}' does not match {authoritative}")]
    Mismatch {
        declared: String,
        authoritative: ActorScope,
    },
}

impl CapabilityContextError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mismatch { .. } => CAPABILITY_CONTEXT_MISMATCH,
            Self::Required { .. } => CAPABILITY_CONTEXT_REQUIRED,
            Self::InvalidAsOf(_) => "invalid_as_of",
            Self::InvalidBusinessUnit(_) => "invalid_business_unit_id",
        }
    }
}

/// Authoritative scope for `role`, rejecting any declared scope that differs from it.
/// Unknown declared values are mismatches.
pub fn check_actor_scope(
    declared_scope: Option<&str>,
    role: &ActorRole,
) -> Result<ActorScope, CapabilityContextError> {
    let actor_scope = ActorScope::for_role(role);
    if let Some(declared) = non_blank(declared_scope) {
        if ActorScope::parse(declared) != Some(actor_scope) {
            return Err(CapabilityContextError::Mismatch {
                declared: declared.to_string(),
                authoritative: actor_scope,
            });
        }
    }
    Ok(actor_scope)
}

/// Validates a declared context against the caller's role.
///
/// The scope comparison runs first: a spoofed scope is rejected even when the rest of
/// the request is malformed.
pub fn resolve_capability_context(
    input: CapabilityContextInput<'_>,
    role: &ActorRole,
    business_unit_required: bool,
) -> Result<CapabilityContext, CapabilityContextError> {
    let actor_scope = check_actor_scope(input.declared_scope, role)?;

    let capability_key = non_blank(input.capability_key)
        .map(str::to_ascii_lowercase)
        .ok_or(CapabilityContextError::Required {
            field: "capability_key",
        })?;
    let raw_as_of =
        non_blank(input.as_of).ok_or(CapabilityContextError::Required { field: "as_of" })?;
    let as_of = parse_iso_date(raw_as_of)
        .ok_or_else(|| CapabilityContextError::InvalidAsOf(raw_as_of.to_string()))?;

    let business_unit_id = match non_blank(input.business_unit_id) {
        Some(id) if is_business_unit_id(id) => Some(id.to_string()),
        Some(id) => return Err(CapabilityContextError::InvalidBusinessUnit(id.to_string())),
        None if business_unit_required => {
            return Err(CapabilityContextError::Required {
                field: "business_unit_id",
            })
        }
        None => None,
    };

    Ok(CapabilityContext {
        capability_key,
        business_unit_id,
        as_of,
        actor_scope,
    })
}
