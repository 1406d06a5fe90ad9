use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;

pub const SETID_NOT_RESOLVED: &str = "SETID_NOT_RESOLVED";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetIdError {
    #[error("no setid configured for business unit '{0}'")]
    NotFound(String),
    #[error("setid resolver unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the shared-configuration set that applies to a business unit.
pub trait SetIdResolver: Send + Sync {
    fn resolve_setid(
        &self,
        tenant_id: &str,
        business_unit_id: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<String, SetIdError>;
}

/// Table-driven resolver with an optional tenant-wide fallback.
#[derive(Debug, Default)]
pub struct StaticSetIdResolver {
    fallback: Option<String>,
    mappings: RwLock<HashMap<(String, String), String>>,
}

impl StaticSetIdResolver {
    pub fn new(fallback: Option<String>) -> Self {
        Self {
            fallback,
            mappings: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(
        &self,
        tenant_id: &str,
        business_unit_id: &str,
        setid: &str,
    ) -> Result<(), SetIdError> {
        self.mappings
            .write()
            .map_err(|_| SetIdError::Unavailable("setid lock poisoned".to_string()))?
            .insert(
                (tenant_id.to_string(), business_unit_id.to_string()),
                setid.trim().to_ascii_uppercase(),
            );
        Ok(())
    }
}

impl SetIdResolver for StaticSetIdResolver {
    fn resolve_setid(
        &self,
        tenant_id: &str,
        business_unit_id: Option<&str>,
        _as_of: NaiveDate,
    ) -> Result<String, SetIdError> {
        let mapped = match business_unit_id {
            Some(business_unit_id) => self
                .mappings
                .read()
                .map_err(|_| SetIdError::Unavailable("setid lock poisoned".to_string()))?
                .get(&(tenant_id.to_string(), business_unit_id.to_string()))
                .cloned(),
            None => None,
        };

        mapped.or_else(|| self.fallback.clone()).ok_or_else(|| {
            SetIdError::NotFound(business_unit_id.unwrap_or_default().to_string())
        })
    }
}
