use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const FIELD_POLICY_MISSING: &str = "FIELD_POLICY_MISSING";
pub const FIELD_POLICY_CONFLICT: &str = "FIELD_POLICY_CONFLICT";
pub const FIELD_DEFAULT_RULE_MISSING: &str = "FIELD_DEFAULT_RULE_MISSING";
pub const FIELD_REQUIRED_IN_CONTEXT: &str = "FIELD_REQUIRED_IN_CONTEXT";
pub const FIELD_HIDDEN_IN_CONTEXT: &str = "FIELD_HIDDEN_IN_CONTEXT";
pub const FIELD_VISIBLE_IN_CONTEXT: &str = "FIELD_VISIBLE_IN_CONTEXT";
pub const EXPLAIN_REQUIRED: &str = "EXPLAIN_REQUIRED";

pub const DEFAULT_PRIORITY: i32 = 100;
pub const DEFAULT_CHANGE_POLICY: &str = "plan_required";

/// How far a policy may be personalized below the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalizationMode {
    TenantOnly,
    Setid,
    ScopePackage,
}

impl PersonalizationMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tenant_only" => Some(Self::TenantOnly),
            "setid" => Some(Self::Setid),
            "scope_package" => Some(Self::ScopePackage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantOnly => "tenant_only",
            Self::Setid => "setid",
            Self::ScopePackage => "scope_package",
        }
    }
}

/// Organizational level a policy item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgLevel {
    Tenant,
    BusinessUnit,
}

impl OrgLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "tenant" => Some(Self::Tenant),
            "business_unit" => Some(Self::BusinessUnit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::BusinessUnit => "business_unit",
        }
    }
}

/// Authoring payload for a policy item, validated by [`super::guard::PolicyGuard`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyItemDraft {
    pub capability_key: String,
    pub owner_module: String,
    pub field_key: String,
    pub personalization_mode: String,
    pub scope_code: String,
    pub org_level: String,
    pub business_unit_id: String,
    pub required: bool,
    pub visible: bool,
    pub default_rule_ref: String,
    pub default_value: String,
    pub priority: i32,
    pub explain_required: bool,
    pub is_stable: bool,
    pub change_policy: String,
    pub effective_date: String,
    pub end_date: Option<String>,
}

/// A versioned field policy fact owned by the strategy registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyItem {
    pub capability_key: String,
    pub owner_module: String,
    pub field_key: String,
    pub personalization_mode: PersonalizationMode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope_code: String,
    pub org_level: OrgLevel,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_unit_id: String,
    pub required: bool,
    pub visible: bool,
    pub default_rule_ref: String,
    pub default_value: String,
    pub priority: i32,
    pub explain_required: bool,
    pub is_stable: bool,
    pub change_policy: String,
    pub effective_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyItem {
    /// Upsert identity, also the registry's sort key.
    pub fn natural_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.capability_key,
            self.field_key,
            self.org_level.as_str(),
            self.business_unit_id,
            self.effective_date.format("%Y-%m-%d")
        )
    }

    pub fn is_effective_on(&self, as_of: NaiveDate) -> bool {
        self.effective_date <= as_of && self.end_date.map_or(true, |end| end > as_of)
    }

    pub fn has_default(&self) -> bool {
        !self.default_rule_ref.trim().is_empty() || !self.default_value.trim().is_empty()
    }

    pub fn is_conflicting(&self) -> bool {
        self.required && !self.visible
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved field behavior for one capability/field in one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecision {
    pub capability_key: String,
    pub field_key: String,
    pub required: bool,
    pub visible: bool,
    pub default_rule_ref: String,
    pub resolved_default_value: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

impl FieldDecision {
    /// Hidden fields deny; visible ones always carry a reason.
    pub fn with_visibility_applied(mut self) -> Self {
        if !self.visible {
            self.decision = Decision::Deny;
            self.reason_code = Some(FIELD_HIDDEN_IN_CONTEXT.to_string());
        } else if self.reason_code.is_none() {
            self.reason_code = Some(FIELD_VISIBLE_IN_CONTEXT.to_string());
        }
        self
    }
}

/// Caller roles as asserted by the session gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActorRole {
    Superadmin,
    TenantAdmin,
    Other(String),
}

impl ActorRole {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "superadmin" | "saas_superadmin" => Self::Superadmin,
            "tenant_admin" => Self::TenantAdmin,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Superadmin => "superadmin",
            Self::TenantAdmin => "tenant_admin",
            Self::Other(role) => role,
        }
    }

    pub fn is_superadmin(&self) -> bool {
        matches!(self, Self::Superadmin)
    }

    /// Roles allowed to see tenant/org identifiers and flip tenant switches.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Superadmin | Self::TenantAdmin)
    }
}

impl From<String> for ActorRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ActorRole> for String {
    fn from(value: ActorRole) -> Self {
        value.as_str().to_string()
    }
}

/// Authenticated caller for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: String,
    pub actor_id: String,
    pub role: ActorRole,
    /// Scope the client claims for itself; checked, never trusted.
    pub declared_scope: Option<String>,
    pub request_id: Option<String>,
}

pub(crate) fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn is_business_unit_id(raw: &str) -> bool {
    raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
