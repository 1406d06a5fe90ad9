use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::domain::{
    is_business_unit_id, parse_iso_date, OrgLevel, PersonalizationMode, PolicyItem,
    PolicyItemDraft, DEFAULT_CHANGE_POLICY, DEFAULT_PRIORITY, EXPLAIN_REQUIRED,
    FIELD_POLICY_CONFLICT,
};

/// Draft attributes that must be present before anything else is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    CapabilityKey,
    OwnerModule,
    FieldKey,
    PersonalizationMode,
    OrgLevel,
    EffectiveDate,
}

impl DraftField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CapabilityKey => "capability_key",
            Self::OwnerModule => "owner_module",
            Self::FieldKey => "field_key",
            Self::PersonalizationMode => "personalization_mode",
            Self::OrgLevel => "org_level",
            Self::EffectiveDate => "effective_date",
        }
    }

    fn missing_code(&self) -> &'static str {
        match self {
            Self::CapabilityKey => "capability_key_required",
            Self::OwnerModule => "owner_module_required",
            Self::FieldKey => "field_key_required",
            Self::PersonalizationMode => "personalization_mode_required",
            Self::OrgLevel => "org_level_required",
            Self::EffectiveDate => "effective_date_required",
        }
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reasons a draft is refused by the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("{0} is required")]
    Missing(DraftField),
    #[error("capability_key '{0}' must be dotted lower_snake segments")]
    InvalidCapabilityKey(String),
    #[error("field_key '{0}' must be a lower_snake identifier")]
    InvalidFieldKey(String),
    #[error("personalization_mode '{0}' is not one of tenant_only, setid, scope_package")]
    InvalidPersonalizationMode(String),
    #[error("org_level '{0}' is not one of tenant, business_unit")]
    InvalidOrgLevel(String),
    #[error("business_unit_id '{0}' must be an 8-digit id")]
    InvalidBusinessUnitId(String),
    #[error("scope_code is required for scope_package personalization")]
    ScopeCodeRequired,
    #[error("explain_required must be set for {0} personalization")]
    ExplainRequired(&'static str),
    #[error("a required field cannot be hidden")]
    RequiredButHidden,
    #[error("effective_date '{0}' is not a YYYY-MM-DD date")]
    InvalidEffectiveDate(String),
    #[error("end_date '{0}' is not a YYYY-MM-DD date")]
    InvalidEndDate(String),
    #[error("end_date must be after effective_date")]
    EndDateNotAfterEffective,
}

impl PolicyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing(field) => field.missing_code(),
            Self::InvalidCapabilityKey(_) => "invalid_capability_key",
            Self::InvalidFieldKey(_) => "invalid_field_key",
            Self::InvalidPersonalizationMode(_) => "invalid_personalization_mode",
            Self::InvalidOrgLevel(_) => "invalid_org_level",
            Self::InvalidBusinessUnitId(_) => "invalid_business_unit_id",
            Self::ScopeCodeRequired => "scope_code_required",
            Self::ExplainRequired(_) => EXPLAIN_REQUIRED,
            Self::RequiredButHidden => FIELD_POLICY_CONFLICT,
            Self::InvalidEffectiveDate(_) => "invalid_effective_date",
            Self::InvalidEndDate(_) => "invalid_end_date",
            Self::EndDateNotAfterEffective => "invalid_date_window",
        }
    }
}

fn capability_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)+$").expect("capability key pattern")
    })
}

fn field_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("field key pattern"))
}

pub fn is_capability_key(raw: &str) -> bool {
    capability_key_pattern().is_match(raw)
}

pub fn is_field_key(raw: &str) -> bool {
    field_key_pattern().is_match(raw)
}

/// Turns authoring drafts into registry items, enforcing the write-time invariants.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyGuard;

impl PolicyGuard {
    pub fn item_from_draft(
        &self,
        draft: PolicyItemDraft,
        updated_at: DateTime<Utc>,
    ) -> Result<PolicyItem, PolicyViolation> {
        let capability_key = normalize_key(&draft.capability_key);
        let owner_module = draft.owner_module.trim().to_string();
        let field_key = normalize_key(&draft.field_key);
        let mode_raw = normalize_key(&draft.personalization_mode);
        let level_raw = normalize_key(&draft.org_level);
        let effective_raw = draft.effective_date.trim().to_string();

        for (value, field) in [
            (&capability_key, DraftField::CapabilityKey),
            (&owner_module, DraftField::OwnerModule),
            (&field_key, DraftField::FieldKey),
            (&mode_raw, DraftField::PersonalizationMode),
            (&level_raw, DraftField::OrgLevel),
            (&effective_raw, DraftField::EffectiveDate),
        ] {
            if value.is_empty() {
                return Err(PolicyViolation::Missing(field));
            }
        }

        if !is_capability_key(&capability_key) {
            return Err(PolicyViolation::InvalidCapabilityKey(capability_key));
        }
        if !is_field_key(&field_key) {
            return Err(PolicyViolation::InvalidFieldKey(field_key));
        }

        let personalization_mode = PersonalizationMode::parse(&mode_raw)
            .ok_or(PolicyViolation::InvalidPersonalizationMode(mode_raw))?;
        let org_level =
            OrgLevel::parse(&level_raw).ok_or(PolicyViolation::InvalidOrgLevel(level_raw))?;

        let business_unit_id = match org_level {
            OrgLevel::Tenant => String::new(),
            OrgLevel::BusinessUnit => {
                let id = draft.business_unit_id.trim().to_string();
                if !is_business_unit_id(&id) {
                    return Err(PolicyViolation::InvalidBusinessUnitId(id));
                }
                id
            }
        };

        let scope_code = draft.scope_code.trim().to_string();
        if personalization_mode == PersonalizationMode::ScopePackage && scope_code.is_empty() {
            return Err(PolicyViolation::ScopeCodeRequired);
        }
        if personalization_mode != PersonalizationMode::TenantOnly && !draft.explain_required {
            return Err(PolicyViolation::ExplainRequired(
                personalization_mode.as_str(),
            ));
        }
        if draft.required && !draft.visible {
            return Err(PolicyViolation::RequiredButHidden);
        }

        let effective_date = parse_iso_date(&effective_raw)
            .ok_or(PolicyViolation::InvalidEffectiveDate(effective_raw))?;
        let end_date = match draft.end_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let end = parse_iso_date(raw)
                    .ok_or_else(|| PolicyViolation::InvalidEndDate(raw.to_string()))?;
                if end <= effective_date {
                    return Err(PolicyViolation::EndDateNotAfterEffective);
                }
                Some(end)
            }
        };

        let change_policy = match draft.change_policy.trim() {
            "" => DEFAULT_CHANGE_POLICY.to_string(),
            other => other.to_string(),
        };

        Ok(PolicyItem {
            capability_key,
            owner_module,
            field_key,
            personalization_mode,
            scope_code,
            org_level,
            business_unit_id,
            required: draft.required,
            visible: draft.visible,
            default_rule_ref: draft.default_rule_ref.trim().to_string(),
            default_value: draft.default_value.trim().to_string(),
            priority: if draft.priority <= 0 {
                DEFAULT_PRIORITY
            } else {
                draft.priority
            },
            explain_required: draft.explain_required,
            is_stable: draft.is_stable,
            change_policy,
            effective_date,
            end_date,
            updated_at,
        })
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
