/*!
 # mc-steward

 A Rust library for supervising one shared Minecraft server on behalf of many tenant groups.

 ## Overview

 mc-steward provides functionality to:
 - Start and stop the server process through a start/stop state machine
 - Observe the server through its log output and its remote console (RCON)
 - Switch the world the server loads between runs
 - Resolve the address players should connect to, fixed or tunneled
 - Keep tenants from operating the server while another tenant's world is loaded

 ## Basic Usage

 ```no_run
 use mc_steward::{AdmissionGate, Config, InMemoryTenantWorlds, ServerController, TenantId, WorldRecord};
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> mc_steward::Result<()> {
     let config = Config::from_file("steward.yaml")?;
     let controller = ServerController::from_config(&config)?;

     let tenants = Arc::new(InMemoryTenantWorlds::new());
     tenants.register(TenantId::from("guild-a"), WorldRecord::new("Castle", "castle"))?;
     let gate = AdmissionGate::new(controller.clone(), tenants);

     let tenant = TenantId::from("guild-a");
     if gate.admit(&tenant).await?.is_allowed() {
         controller.start(Some("castle")).await?;
     }

     println!("Players connect to {:?}", controller.host().await);
     Ok(())
 }
 ```

 ## Features

 - **Lifecycle**: Bounded start/stop transitions with a watchdog and console probe fallback
 - **Remote Console**: Minimal RCON client with roster parsing
 - **Worlds**: Validated world switching through the server property file
 - **Hosting**: Static addresses or tunnels from a local tunneling agent
 - **Events**: Push callbacks and a broadcast channel for lifecycle events
 - **Configuration**: JSON or YAML config files
*/

pub mod admission;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod rcon;
pub mod server;
pub mod world;

pub use admission::{Admission, AdmissionGate, InMemoryTenantWorlds, TenantId, TenantWorlds};
pub use config::Config;
pub use controller::ServerController;
pub use error::{Error, Result};
pub use host::{HostResolver, StaticHost, TunnelHost};
pub use rcon::{PlayerRosterEntry, RconSession, RemoteConsole};
pub use server::{ServerEvent, ServerLifecycleEvent, ServerState};
pub use world::{WorldRecord, WorldRegistry};
