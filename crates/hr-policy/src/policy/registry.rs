use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{non_blank, parse_iso_date, PolicyItem, PolicyItemDraft};
use super::guard::{PolicyGuard, PolicyViolation};

/// Result of a registry upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub item: PolicyItem,
    /// `true` when an item with the same natural key was replaced.
    pub updated: bool,
}

/// Storage seam for versioned field policy facts, partitioned per tenant.
pub trait StrategyRegistry: Send + Sync {
    fn upsert(
        &self,
        tenant_id: &str,
        draft: PolicyItemDraft,
    ) -> Result<UpsertOutcome, RegistryError>;

    /// Items effective on `as_of`, optionally narrowed to one capability and field.
    fn list(
        &self,
        tenant_id: &str,
        capability_key: Option<&str>,
        field_key: Option<&str>,
        as_of: &str,
    ) -> Result<Vec<PolicyItem>, RegistryError>;

    /// Same filter as [`StrategyRegistry::list`], read together with the tenant revision
    /// so the version label always matches the items it describes.
    fn snapshot(
        &self,
        tenant_id: &str,
        capability_key: Option<&str>,
        field_key: Option<&str>,
        as_of: &str,
    ) -> Result<PolicySnapshot, RegistryError>;

    /// Count of accepted upserts for the tenant.
    fn revision(&self, tenant_id: &str) -> Result<u64, RegistryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub revision: u64,
    pub items: Vec<PolicyItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tenant_id is required")]
    TenantRequired,
    #[error(transparent)]
    Invalid(#[from] PolicyViolation),
    #[error("as_of '{0}' is not a YYYY-MM-DD date")]
    InvalidAsOf(String),
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct TenantPartition {
    items: Vec<PolicyItem>,
    revision: u64,
}

/// Process-local registry. Construct one per service (or per test) and inject it.
#[derive(Debug, Default)]
pub struct InMemoryStrategyRegistry {
    guard: PolicyGuard,
    tenants: RwLock<HashMap<String, TenantPartition>>,
}

impl InMemoryStrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every tenant partition ahead of a rebuild from the source of truth.
    pub fn reset(&self) -> Result<(), RegistryError> {
        self.write()?.clear();
        Ok(())
    }

    pub fn len(&self, tenant_id: &str) -> Result<usize, RegistryError> {
        let tenant_id = tenant_key(tenant_id)?;
        Ok(self
            .read()?
            .get(&tenant_id)
            .map_or(0, |partition| partition.items.len()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, TenantPartition>>, RegistryError> {
        self.tenants
            .read()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, TenantPartition>>, RegistryError> {
        self.tenants
            .write()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))
    }
}

impl StrategyRegistry for InMemoryStrategyRegistry {
    fn upsert(
        &self,
        tenant_id: &str,
        draft: PolicyItemDraft,
    ) -> Result<UpsertOutcome, RegistryError> {
        let tenant_id = tenant_key(tenant_id)?;
        let item = self.guard.item_from_draft(draft, Utc::now())?;
        let key = item.natural_key();

        let mut tenants = self.write()?;
        let partition = tenants.entry(tenant_id.clone()).or_default();
        let updated = match partition
            .items
            .iter()
            .position(|existing| existing.natural_key() == key)
        {
            Some(index) => {
                partition.items[index] = item.clone();
                true
            }
            None => {
                partition.items.push(item.clone());
                false
            }
        };
        partition.items.sort_by_cached_key(PolicyItem::natural_key);
        partition.revision += 1;

        info!(
            tenant_id = %tenant_id,
            natural_key = %key,
            updated,
            revision = partition.revision,
            "field policy item upserted"
        );

        Ok(UpsertOutcome { item, updated })
    }

    fn list(
        &self,
        tenant_id: &str,
        capability_key: Option<&str>,
        field_key: Option<&str>,
        as_of: &str,
    ) -> Result<Vec<PolicyItem>, RegistryError> {
        self.snapshot(tenant_id, capability_key, field_key, as_of)
            .map(|snapshot| snapshot.items)
    }

    fn snapshot(
        &self,
        tenant_id: &str,
        capability_key: Option<&str>,
        field_key: Option<&str>,
        as_of: &str,
    ) -> Result<PolicySnapshot, RegistryError> {
        let as_of_date =
            parse_iso_date(as_of).ok_or_else(|| RegistryError::InvalidAsOf(as_of.to_string()))?;
        let tenant_id = tenant_key(tenant_id)?;
        let capability_key = non_blank(capability_key).map(str::to_ascii_lowercase);
        let field_key = non_blank(field_key).map(str::to_ascii_lowercase);

        let tenants = self.read()?;
        let Some(partition) = tenants.get(&tenant_id) else {
            return Ok(PolicySnapshot::default());
        };

        let items = partition
            .items
            .iter()
            .filter(|item| {
                capability_key
                    .as_deref()
                    .map_or(true, |key| item.capability_key == key)
            })
            .filter(|item| field_key.as_deref().map_or(true, |key| item.field_key == key))
            .filter(|item| item.is_effective_on(as_of_date))
            .cloned()
            .collect();
        Ok(PolicySnapshot {
            revision: partition.revision,
            items,
        })
    }

    fn revision(&self, tenant_id: &str) -> Result<u64, RegistryError> {
        let tenant_id = tenant_key(tenant_id)?;
        Ok(self
            .read()?
            .get(&tenant_id)
            .map_or(0, |partition| partition.revision))
    }
}

fn tenant_key(tenant_id: &str) -> Result<String, RegistryError> {
    non_blank(Some(tenant_id))
        .map(str::to_string)
        .ok_or(RegistryError::TenantRequired)
}
