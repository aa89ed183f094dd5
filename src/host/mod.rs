//! Host resolution: the address a tenant should give to players.
//!
//! Resolution never fails loudly. Anything that goes wrong yields `None`
//! ("host unavailable") and a warning, and never holds up the state machine.
mod tunnel;

pub use tunnel::{
    CreateTunnel, HttpTunnelApi, Tunnel, TunnelApi, TunnelHost, connectable_address,
    find_bound_tunnel,
};

use crate::config::HostConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Produces the address players connect to.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self) -> Option<String>;
}

/// A fixed address
#[derive(Debug, Clone)]
pub struct StaticHost {
    address: String,
}

impl StaticHost {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl HostResolver for StaticHost {
    async fn resolve(&self) -> Option<String> {
        Some(self.address.clone())
    }
}

/// Build the resolver selected by configuration
pub fn resolver_from_config(config: &HostConfig) -> Result<Arc<dyn HostResolver>> {
    match config {
        HostConfig::Static { address } => Ok(Arc::new(StaticHost::new(address.clone()))),
        HostConfig::Tunnel {
            api_url,
            local_address,
            protocol,
            name,
            request_timeout_secs,
        } => {
            let api = HttpTunnelApi::new(api_url, Duration::from_secs(*request_timeout_secs))?;
            Ok(Arc::new(TunnelHost::new(
                api,
                local_address.clone(),
                protocol.clone(),
                name.clone(),
            )))
        }
    }
}
