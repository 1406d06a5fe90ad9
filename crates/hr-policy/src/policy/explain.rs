use serde::{Deserialize, Serialize};

use super::domain::FieldDecision;

pub const EXPLAIN_LEVEL_FORBIDDEN: &str = "EXPLAIN_LEVEL_FORBIDDEN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainLevel {
    #[default]
    Brief,
    Full,
}

impl ExplainLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "brief" => Some(Self::Brief),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Query accepted by the explain endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExplainRequest {
    pub capability_key: Option<String>,
    pub field_key: Option<String>,
    pub business_unit_id: Option<String>,
    pub scope_code: Option<String>,
    pub as_of: Option<String>,
    pub level: Option<String>,
    pub org_unit_id: Option<String>,
    pub setid: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainResponse {
    pub level: ExplainLevel,
    pub trace_id: String,
    pub request_id: String,
    pub capability_key: String,
    pub field_key: String,
    pub functional_area_key: String,
    pub setid: String,
    pub as_of: String,
    pub policy_version: String,
    pub decision: FieldDecision,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub full: Option<FullExplainDetails>,
}

/// Identifiers only elevated callers may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullExplainDetails {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit_id: Option<String>,
    pub resolved_config_version: String,
}
