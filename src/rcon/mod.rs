//! Remote console (RCON) client.
//!
//! [`RemoteConsole`] is the seam the controller talks through;
//! [`RconSession`] implements it over TCP using the Source RCON framing that
//! Minecraft servers speak.
mod packet;
mod roster;
mod session;

pub use packet::{
    AUTH_FAILED_ID, MAX_BODY_LEN, PACKET_AUTH_RESPONSE, PACKET_COMMAND, PACKET_LOGIN,
    PACKET_RESPONSE, Packet,
};
pub use roster::{PlayerRosterEntry, parse_player_count, parse_roster};
pub use session::RconSession;

use crate::error::Result;
use async_trait::async_trait;

/// A remote console the controller can probe and command.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    /// Open the connection. A no-op when already connected.
    async fn connect(&self) -> Result<()>;

    /// Send one command and return the server's reply.
    async fn send(&self, command: &str) -> Result<String>;

    /// Drop the connection. Safe to call repeatedly.
    async fn close(&self);

    /// Fetch and parse the current player list.
    async fn roster(&self) -> Result<Vec<PlayerRosterEntry>> {
        let response = self.send("list").await?;
        parse_roster(&response)
    }
}
