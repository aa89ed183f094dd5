use super::HostResolver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A tunnel as reported by the tunneling agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub name: String,
    pub public_address: String,
    pub protocol: String,
    pub bound_local_address: String,
}

/// Request body for creating a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateTunnel {
    pub addr: String,
    pub proto: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TunnelConfigJson {
    addr: String,
}

#[derive(Debug, Deserialize)]
struct TunnelJson {
    name: String,
    public_url: String,
    proto: String,
    config: TunnelConfigJson,
}

impl From<TunnelJson> for Tunnel {
    fn from(json: TunnelJson) -> Self {
        Self {
            name: json.name,
            public_address: json.public_url,
            protocol: json.proto,
            bound_local_address: json.config.addr,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TunnelListJson {
    tunnels: Vec<TunnelJson>,
}

/// The tunneling agent's control API.
#[async_trait]
pub trait TunnelApi: Send + Sync {
    /// `GET /tunnels`
    async fn list_tunnels(&self) -> Result<Vec<Tunnel>>;
    /// `POST /tunnels`
    async fn create_tunnel(&self, request: &CreateTunnel) -> Result<Tunnel>;
    /// `DELETE /tunnels/{name}`
    async fn delete_tunnel(&self, name: &str) -> Result<()>;
}

/// [`TunnelApi`] over HTTP with `reqwest`.
pub struct HttpTunnelApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTunnelApi {
    /// `base_url` is the API root, e.g. `http://127.0.0.1:4040/api`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::ConfigValidation(format!("Invalid tunnel API URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Tunnel(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Tunnel(format!("Invalid tunnel endpoint '{}': {}", path, e)))
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Tunnel(format!("HTTP {}: {}", status, body.trim())))
        }
    }
}

#[async_trait]
impl TunnelApi for HttpTunnelApi {
    async fn list_tunnels(&self) -> Result<Vec<Tunnel>> {
        let response = self
            .client
            .get(self.endpoint("tunnels")?)
            .send()
            .await
            .map_err(|e| Error::Tunnel(format!("GET tunnels failed: {}", e)))?;
        let list: TunnelListJson = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Tunnel(format!("Malformed tunnel list: {}", e)))?;
        Ok(list.tunnels.into_iter().map(Tunnel::from).collect())
    }

    async fn create_tunnel(&self, request: &CreateTunnel) -> Result<Tunnel> {
        let response = self
            .client
            .post(self.endpoint("tunnels")?)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Tunnel(format!("POST tunnels failed: {}", e)))?;
        let tunnel: TunnelJson = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Tunnel(format!("Malformed tunnel: {}", e)))?;
        Ok(tunnel.into())
    }

    async fn delete_tunnel(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("tunnels/{}", name))?)
            .send()
            .await
            .map_err(|e| Error::Tunnel(format!("DELETE tunnel failed: {}", e)))?;
        Self::checked(response).await?;
        Ok(())
    }
}

/// Public address players can paste: the URL scheme is dropped.
pub fn connectable_address(public_address: &str) -> String {
    match public_address.split_once("://") {
        Some((_, rest)) => rest.trim_end_matches('/').to_string(),
        None => public_address.to_string(),
    }
}

/// First tunnel bound to exactly `local_address`
pub fn find_bound_tunnel<'a>(tunnels: &'a [Tunnel], local_address: &str) -> Option<&'a Tunnel> {
    tunnels
        .iter()
        .find(|tunnel| tunnel.bound_local_address == local_address)
}

/// Resolves the host through a tunnel bound to the server's local address.
///
/// Tunnels bound to anything else are never returned, even if they are the
/// only ones running on the agent.
pub struct TunnelHost<A> {
    api: A,
    local_address: String,
    protocol: String,
    name: String,
}

impl<A: TunnelApi> TunnelHost<A> {
    pub fn new(
        api: A,
        local_address: impl Into<String>,
        protocol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            local_address: local_address.into(),
            protocol: protocol.into(),
            name: name.into(),
        }
    }

    async fn find_or_create(&self) -> Result<Tunnel> {
        let tunnels = self.api.list_tunnels().await?;
        if let Some(tunnel) = find_bound_tunnel(&tunnels, &self.local_address) {
            return Ok(tunnel.clone());
        }

        tracing::info!(local_address = %self.local_address, "No tunnel bound, requesting one");
        let created = self
            .api
            .create_tunnel(&CreateTunnel {
                addr: self.local_address.clone(),
                proto: self.protocol.clone(),
                name: self.name.clone(),
            })
            .await?;

        if created.bound_local_address != self.local_address {
            return Err(Error::Tunnel(format!(
                "tunnel '{}' is bound to {} instead of {}",
                created.name, created.bound_local_address, self.local_address
            )));
        }
        Ok(created)
    }

    /// Tear down the tunnel this resolver creates
    #[tracing::instrument(skip(self), fields(name = %self.name))]
    pub async fn teardown(&self) -> Result<()> {
        self.api.delete_tunnel(&self.name).await
    }
}

#[async_trait]
impl<A: TunnelApi> HostResolver for TunnelHost<A> {
    #[tracing::instrument(skip(self), fields(local_address = %self.local_address))]
    async fn resolve(&self) -> Option<String> {
        match self.find_or_create().await {
            Ok(tunnel) => Some(connectable_address(&tunnel.public_address)),
            Err(e) => {
                tracing::warn!(error = %e, "Host unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_listing() {
        let body = r#"{
            "tunnels": [{
                "name": "minecraft",
                "public_url": "tcp://0.tcp.eu.ngrok.io:14523",
                "proto": "tcp",
                "config": { "addr": "localhost:25565", "inspect": false }
            }],
            "uri": "/api/tunnels"
        }"#;

        let list: TunnelListJson = serde_json::from_str(body).unwrap();
        let tunnels: Vec<Tunnel> = list.tunnels.into_iter().map(Tunnel::from).collect();
        assert_eq!(tunnels[0].bound_local_address, "localhost:25565");
        assert_eq!(
            connectable_address(&tunnels[0].public_address),
            "0.tcp.eu.ngrok.io:14523"
        );
    }

    #[test]
    fn only_exact_bindings_match() {
        let tunnel = Tunnel {
            name: "web".to_string(),
            public_address: "https://abc.ngrok.app".to_string(),
            protocol: "https".to_string(),
            bound_local_address: "http://localhost:8080".to_string(),
        };
        let tunnels = vec![tunnel];
        assert!(find_bound_tunnel(&tunnels, "localhost:25565").is_none());
        assert!(find_bound_tunnel(&tunnels, "http://localhost:8080").is_some());
    }
}
