//! JSON seed used to rebuild the in-process registry, setid table, and tenant switches.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::PolicyItemDraft;
use super::functional_area::{FunctionalAreaError, FunctionalAreaGate, FunctionalAreaSwitchStore};
use super::registry::{RegistryError, StrategyRegistry};
use super::setid::{SetIdError, StaticSetIdResolver};

pub const DEMO_TENANT: &str = "tenant-demo";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySeed {
    pub items: Vec<SeedItem>,
    pub setids: Vec<SetIdMapping>,
    pub disabled_areas: Vec<DisabledArea>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedItem {
    pub tenant_id: String,
    #[serde(flatten)]
    pub draft: PolicyItemDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetIdMapping {
    pub tenant_id: String,
    pub business_unit_id: String,
    pub setid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledArea {
    pub tenant_id: String,
    pub area_key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub items: usize,
    pub setids: usize,
    pub disabled_areas: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("seed {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("seed item {index} for tenant {tenant_id} was rejected")]
    Item {
        index: usize,
        tenant_id: String,
        #[source]
        source: RegistryError,
    },
    #[error(transparent)]
    SetId(#[from] SetIdError),
    #[error(transparent)]
    FunctionalArea(#[from] FunctionalAreaError),
}

impl PolicySeed {
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads every entry; the first rejected entry aborts the rebuild.
    pub fn apply<R, S>(
        &self,
        registry: &R,
        setids: &StaticSetIdResolver,
        gate: &FunctionalAreaGate<S>,
    ) -> Result<SeedSummary, SeedError>
    where
        R: StrategyRegistry + ?Sized,
        S: FunctionalAreaSwitchStore,
    {
        for (index, entry) in self.items.iter().enumerate() {
            registry
                .upsert(&entry.tenant_id, entry.draft.clone())
                .map_err(|source| SeedError::Item {
                    index,
                    tenant_id: entry.tenant_id.clone(),
                    source,
                })?;
        }
        for mapping in &self.setids {
            setids.insert(&mapping.tenant_id, &mapping.business_unit_id, &mapping.setid)?;
        }
        for area in &self.disabled_areas {
            gate.set_enabled(&area.tenant_id, &area.area_key, false)?;
        }

        let summary = SeedSummary {
            items: self.items.len(),
            setids: self.setids.len(),
            disabled_areas: self.disabled_areas.len(),
        };
        info!(
            items = summary.items,
            setids = summary.setids,
            disabled_areas = summary.disabled_areas,
            "policy seed applied"
        );
        Ok(summary)
    }

    /// Staffing assignment policies for one demo tenant with a business-unit override.
    pub fn demo() -> Self {
        let capability = "staffing.assignment_create.field_policy";
        let tenant_item = |field_key: &str, default_value: &str| SeedItem {
            tenant_id: DEMO_TENANT.to_string(),
            draft: PolicyItemDraft {
                capability_key: capability.to_string(),
                owner_module: "staffing".to_string(),
                field_key: field_key.to_string(),
                personalization_mode: "tenant_only".to_string(),
                org_level: "tenant".to_string(),
                visible: true,
                default_value: default_value.to_string(),
                priority: 100,
                effective_date: "2026-01-01".to_string(),
                ..PolicyItemDraft::default()
            },
        };
        let business_unit_item = |field_key: &str, required: bool, visible: bool, priority| {
            SeedItem {
                tenant_id: DEMO_TENANT.to_string(),
                draft: PolicyItemDraft {
                    capability_key: capability.to_string(),
                    owner_module: "staffing".to_string(),
                    field_key: field_key.to_string(),
                    personalization_mode: "setid".to_string(),
                    org_level: "business_unit".to_string(),
                    business_unit_id: "10000001".to_string(),
                    required,
                    visible,
                    default_rule_ref: format!("rule://staffing/{field_key}/bu-10000001"),
                    priority,
                    explain_required: true,
                    effective_date: "2026-01-01".to_string(),
                    ..PolicyItemDraft::default()
                },
            }
        };

        Self {
            items: vec![
                tenant_item("employment_type", "full_time"),
                business_unit_item("employment_type", true, true, 200),
                tenant_item("cost_center", "CC-1000"),
                business_unit_item("cost_center", false, false, 300),
            ],
            setids: vec![SetIdMapping {
                tenant_id: DEMO_TENANT.to_string(),
                business_unit_id: "10000001".to_string(),
                setid: "S2601".to_string(),
            }],
            disabled_areas: Vec::new(),
        }
    }
}
