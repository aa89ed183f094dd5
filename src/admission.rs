//! Cross-tenant admission control.
//!
//! Many tenants share one server. A tenant may operate it while it is
//! Offline, or while the loaded world is one of its own registered worlds.
//! World ownership is the only lock; nothing is queued and every decision
//! is made fresh.
use crate::controller::ServerController;
use crate::error::{Error, Result};
use crate::server::ServerState;
use crate::world::WorldRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Reason given to a tenant that is denied
pub const DENIED_REASON: &str = "running in another guild";

/// Identifier of a tenant group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-tenant world registrations, owned outside this crate.
#[async_trait]
pub trait TenantWorlds: Send + Sync {
    async fn registered_worlds(&self, tenant: &TenantId) -> Result<Vec<WorldRecord>>;
}

/// [`TenantWorlds`] kept in memory
#[derive(Default)]
pub struct InMemoryTenantWorlds {
    worlds: RwLock<HashMap<TenantId, Vec<WorldRecord>>>,
}

impl InMemoryTenantWorlds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` for `tenant`, replacing a record with the same folder
    pub fn register(&self, tenant: TenantId, record: WorldRecord) -> Result<()> {
        let mut worlds = self
            .worlds
            .write()
            .map_err(|_| Error::Other("Failed to lock tenant worlds".to_string()))?;
        let records = worlds.entry(tenant).or_default();
        records.retain(|existing| existing.folder_name != record.folder_name);
        records.push(record);
        Ok(())
    }

    /// Drop the registration of `folder_name`; true if one existed
    pub fn unregister(&self, tenant: &TenantId, folder_name: &str) -> Result<bool> {
        let mut worlds = self
            .worlds
            .write()
            .map_err(|_| Error::Other("Failed to lock tenant worlds".to_string()))?;
        let Some(records) = worlds.get_mut(tenant) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|existing| existing.folder_name != folder_name);
        Ok(records.len() != before)
    }
}

#[async_trait]
impl TenantWorlds for InMemoryTenantWorlds {
    async fn registered_worlds(&self, tenant: &TenantId) -> Result<Vec<WorldRecord>> {
        let worlds = self
            .worlds
            .read()
            .map_err(|_| Error::Other("Failed to lock tenant worlds".to_string()))?;
        Ok(worlds.get(tenant).cloned().unwrap_or_default())
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(String),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Whether `loaded` is one of the `registered` worlds, compared by folder name
pub fn owns_world(registered: &[WorldRecord], loaded: &str) -> bool {
    registered.iter().any(|record| record.folder_name == loaded)
}

/// Deny iff the server is not Offline and the loaded world belongs to someone else
pub fn decide(state: ServerState, loaded: &str, registered: &[WorldRecord]) -> Admission {
    if state != ServerState::Offline && !owns_world(registered, loaded) {
        Admission::Denied(DENIED_REASON.to_string())
    } else {
        Admission::Allowed
    }
}

/// Checks whether a tenant may operate the shared server right now.
pub struct AdmissionGate {
    controller: ServerController,
    tenants: Arc<dyn TenantWorlds>,
}

impl AdmissionGate {
    pub fn new(controller: ServerController, tenants: Arc<dyn TenantWorlds>) -> Self {
        Self {
            controller,
            tenants,
        }
    }

    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn admit(&self, tenant: &TenantId) -> Result<Admission> {
        let state = self.controller.state().await;
        let loaded = self.controller.active_world()?;
        let registered = self.tenants.registered_worlds(tenant).await?;

        let admission = decide(state, &loaded, &registered);
        if !admission.is_allowed() {
            tracing::info!(%state, loaded = %loaded, "Admission denied");
        }
        Ok(admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_uses_folder_name() {
        let registered = vec![WorldRecord::new("Castle Build", "castle")];
        assert!(owns_world(&registered, "castle"));
        assert!(!owns_world(&registered, "Castle Build"));
        assert!(!owns_world(&[], "castle"));
    }

    #[test]
    fn offline_always_admits() {
        assert_eq!(decide(ServerState::Offline, "castle", &[]), Admission::Allowed);
    }
}
