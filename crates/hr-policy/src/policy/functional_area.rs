use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const FUNCTIONAL_AREA_MISSING: &str = "FUNCTIONAL_AREA_MISSING";
pub const FUNCTIONAL_AREA_DISABLED: &str = "FUNCTIONAL_AREA_DISABLED";
pub const FUNCTIONAL_AREA_NOT_ACTIVE: &str = "FUNCTIONAL_AREA_NOT_ACTIVE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaLifecycle {
    Active,
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDefinition {
    pub capability_key: String,
    pub functional_area_key: String,
    pub business_unit_required: bool,
}

/// Static ownership of capabilities by functional areas.
#[derive(Debug, Clone, Default)]
pub struct FunctionalAreaCatalog {
    areas: BTreeMap<String, AreaLifecycle>,
    capabilities: BTreeMap<String, CapabilityDefinition>,
}

impl FunctionalAreaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(mut self, area_key: &str, lifecycle: AreaLifecycle) -> Self {
        self.areas.insert(area_key.to_string(), lifecycle);
        self
    }

    pub fn with_capability(
        mut self,
        capability_key: &str,
        area_key: &str,
        business_unit_required: bool,
    ) -> Self {
        self.capabilities.insert(
            capability_key.to_string(),
            CapabilityDefinition {
                capability_key: capability_key.to_string(),
                functional_area_key: area_key.to_string(),
                business_unit_required,
            },
        );
        self
    }

    /// Capabilities shipped with the HR administration modules.
    pub fn standard() -> Self {
        Self::new()
            .with_area("staffing", AreaLifecycle::Active)
            .with_area("org_foundation", AreaLifecycle::Active)
            .with_area("job_catalog", AreaLifecycle::Active)
            .with_area("person", AreaLifecycle::Active)
            .with_area("payroll", AreaLifecycle::Reserved)
            .with_capability("staffing.assignment_create.field_policy", "staffing", true)
            .with_capability("staffing.position_create.field_policy", "staffing", true)
            .with_capability("org.orgunit_create.field_policy", "org_foundation", false)
            .with_capability(
                "jobcatalog.job_profile_create.field_policy",
                "job_catalog",
                true,
            )
            .with_capability("payroll.pay_group_assign.field_policy", "payroll", true)
            .with_capability("person.person_create.field_policy", "person", false)
    }

    pub fn capability(&self, capability_key: &str) -> Option<&CapabilityDefinition> {
        self.capabilities.get(capability_key)
    }

    pub fn area(&self, area_key: &str) -> Option<AreaLifecycle> {
        self.areas.get(area_key).copied()
    }

    pub fn business_unit_required(&self, capability_key: &str) -> bool {
        self.capability(capability_key)
            .map_or(false, |definition| definition.business_unit_required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchStoreError {
    #[error("functional area switch store unavailable: {0}")]
    Unavailable(String),
}

/// Per-tenant on/off state of functional areas. Areas are enabled unless switched off.
pub trait FunctionalAreaSwitchStore: Send + Sync {
    fn is_enabled(&self, tenant_id: &str, area_key: &str) -> Result<bool, SwitchStoreError>;

    fn set_enabled(
        &self,
        tenant_id: &str,
        area_key: &str,
        enabled: bool,
    ) -> Result<(), SwitchStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySwitchStore {
    switches: RwLock<HashMap<(String, String), bool>>,
}

impl InMemorySwitchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FunctionalAreaSwitchStore for InMemorySwitchStore {
    fn is_enabled(&self, tenant_id: &str, area_key: &str) -> Result<bool, SwitchStoreError> {
        let switches = self
            .switches
            .read()
            .map_err(|_| SwitchStoreError::Unavailable("switch lock poisoned".to_string()))?;
        Ok(switches
            .get(&(tenant_id.to_string(), area_key.to_string()))
            .copied()
            .unwrap_or(true))
    }

    fn set_enabled(
        &self,
        tenant_id: &str,
        area_key: &str,
        enabled: bool,
    ) -> Result<(), SwitchStoreError> {
        let mut switches = self
            .switches
            .write()
            .map_err(|_| SwitchStoreError::Unavailable("switch lock poisoned".to_string()))?;
        switches.insert((tenant_id.to_string(), area_key.to_string()), enabled);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionalAreaError {
    #[error("no active functional area owns {0}")]
    Missing(String),
    #[error("functional area {0} is not active")]
    NotActive(String),
    #[error("functional area {0} is disabled for this tenant")]
    Disabled(String),
    #[error(transparent)]
    Store(#[from] SwitchStoreError),
}

impl FunctionalAreaError {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Missing(_) => Some(FUNCTIONAL_AREA_MISSING),
            Self::NotActive(_) => Some(FUNCTIONAL_AREA_NOT_ACTIVE),
            Self::Disabled(_) => Some(FUNCTIONAL_AREA_DISABLED),
            Self::Store(_) => None,
        }
    }
}

/// Catalog lookup plus tenant switch check for a capability.
pub struct FunctionalAreaGate<S> {
    catalog: FunctionalAreaCatalog,
    switches: Arc<S>,
}

impl<S> FunctionalAreaGate<S>
where
    S: FunctionalAreaSwitchStore,
{
    pub fn new(catalog: FunctionalAreaCatalog, switches: Arc<S>) -> Self {
        Self { catalog, switches }
    }

    pub fn catalog(&self) -> &FunctionalAreaCatalog {
        &self.catalog
    }

    /// Returns the owning definition when the capability may be used by the tenant.
    pub fn check(
        &self,
        tenant_id: &str,
        capability_key: &str,
    ) -> Result<&CapabilityDefinition, FunctionalAreaError> {
        let result = self.evaluate(tenant_id, capability_key);
        if let Err(err) = &result {
            warn!(%tenant_id, %capability_key, error = %err, "functional area gate rejected capability");
        }
        result
    }

    fn evaluate(
        &self,
        tenant_id: &str,
        capability_key: &str,
    ) -> Result<&CapabilityDefinition, FunctionalAreaError> {
        let definition = self
            .catalog
            .capability(capability_key)
            .ok_or_else(|| FunctionalAreaError::Missing(capability_key.to_string()))?;
        let area_key = &definition.functional_area_key;
        match self.catalog.area(area_key) {
            None => return Err(FunctionalAreaError::Missing(capability_key.to_string())),
            Some(AreaLifecycle::Reserved) => {
                return Err(FunctionalAreaError::NotActive(area_key.clone()))
            }
            Some(AreaLifecycle::Active) => {}
        }
        if !self.switches.is_enabled(tenant_id, area_key)? {
            return Err(FunctionalAreaError::Disabled(area_key.clone()));
        }
        Ok(definition)
    }

    /// Flips a tenant switch for a known area. Repeating the same state is a no-op.
    pub fn set_enabled(
        &self,
        tenant_id: &str,
        area_key: &str,
        enabled: bool,
    ) -> Result<(), FunctionalAreaError> {
        if self.catalog.area(area_key).is_none() {
            return Err(FunctionalAreaError::Missing(area_key.to_string()));
        }
        self.switches.set_enabled(tenant_id, area_key, enabled)?;
        info!(%tenant_id, %area_key, enabled, "functional area switch updated");
        Ok(())
    }
}
