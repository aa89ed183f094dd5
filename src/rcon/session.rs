use super::packet::{AUTH_FAILED_ID, PACKET_AUTH_RESPONSE, PACKET_RESPONSE, Packet};
use super::roster::{PlayerRosterEntry, parse_player_count, parse_roster};
use super::RemoteConsole;
use crate::config::RconConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

// Frames the server may send ahead of the login response.
const MAX_SKIPPED_FRAMES: usize = 4;

// Upper bound on the frames of one reply, 256 KiB of body.
const MAX_REPLY_FRAMES: usize = 64;

/// RconSession talks to the server's remote console over one TCP connection.
///
/// The connection is opened lazily by [`connect`](RemoteConsole::connect) and
/// reused for every [`send`](RemoteConsole::send). Any I/O failure drops the
/// connection and the cached roster; the caller decides whether to reconnect.
/// The session never retries on its own. Logging in is bounded by the
/// connect timeout and every command by the command timeout; a command that
/// runs out of time counts as an I/O failure.
///
/// # Example
///
/// ```no_run
/// use mc_steward::config::RconConfig;
/// use mc_steward::rcon::{RconSession, RemoteConsole};
///
/// #[tokio::main]
/// async fn main() -> mc_steward::Result<()> {
///     let session = RconSession::new(RconConfig {
///         password: "hunter2".to_string(),
///         ..RconConfig::default()
///     });
///     session.connect().await?;
///     for player in session.roster().await? {
///         println!("{} ({})", player.name, player.identifier);
///     }
///     session.close().await;
///     Ok(())
/// }
/// ```
pub struct RconSession {
    config: RconConfig,
    connection: Mutex<Option<TcpStream>>,
    roster: StdMutex<Vec<PlayerRosterEntry>>,
    next_id: AtomicI32,
}

impl RconSession {
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            roster: StdMutex::new(Vec::new()),
            next_id: AtomicI32::new(1),
        }
    }

    fn next_request_id(&self) -> i32 {
        // Wrap before reaching the reserved -1.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            self.next_id.store(2, Ordering::Relaxed);
            1
        } else {
            id
        }
    }

    /// Whether a connection is currently cached
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Roster from the last successful `list`, empty after a disconnect
    pub fn cached_roster(&self) -> Vec<PlayerRosterEntry> {
        self.roster
            .lock()
            .map(|roster| roster.clone())
            .unwrap_or_default()
    }

    fn store_roster(&self, entries: Vec<PlayerRosterEntry>) {
        if let Ok(mut roster) = self.roster.lock() {
            *roster = entries;
        }
    }

    async fn open(&self) -> Result<TcpStream> {
        let address = self.config.address();
        tokio::time::timeout(self.config.connect_timeout(), self.handshake(&address))
            .await
            .map_err(|_| Error::ConnectionRefused(format!("{} timed out", address)))?
    }

    async fn handshake(&self, address: &str) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| Error::ConnectionRefused(format!("{}: {}", address, e)))?;

        let request_id = self.next_request_id();
        Packet::login(request_id, &self.config.password)
            .write_to(&mut stream)
            .await?;

        for _ in 0..=MAX_SKIPPED_FRAMES {
            let reply = Packet::read_from(&mut stream).await?;
            if reply.request_id == AUTH_FAILED_ID {
                return Err(Error::Authentication);
            }
            if reply.kind == PACKET_AUTH_RESPONSE && reply.request_id == request_id {
                return Ok(stream);
            }
        }

        Err(Error::Protocol("no login response".to_string()))
    }

    /// Send `command` and collect its reply, which may span several frames.
    ///
    /// An empty frame with `marker_id` follows the command. The server
    /// answers in order, so its reply to the marker ends the command's reply.
    async fn exchange(
        stream: &mut TcpStream,
        request_id: i32,
        marker_id: i32,
        command: &str,
    ) -> Result<String> {
        Packet::command(request_id, command).write_to(stream).await?;
        Packet::new(marker_id, PACKET_RESPONSE, "")
            .write_to(stream)
            .await?;

        let mut body = String::new();
        for _ in 0..MAX_REPLY_FRAMES {
            let reply = Packet::read_from(stream).await?;
            if reply.request_id == marker_id {
                return Ok(body);
            }
            if reply.request_id == request_id {
                body.push_str(&reply.body);
            } else {
                tracing::debug!(expected = request_id, got = reply.request_id, "Skipping unrelated RCON frame");
            }
        }

        Err(Error::Protocol(format!(
            "reply to request {} exceeds {} frames",
            request_id, MAX_REPLY_FRAMES
        )))
    }
}

#[async_trait]
impl RemoteConsole for RconSession {
    #[tracing::instrument(skip(self), fields(address = %self.config.address()))]
    async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Ok(());
        }

        let stream = self.open().await?;
        tracing::debug!("Remote console connected");
        *connection = Some(stream);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn send(&self, command: &str) -> Result<String> {
        let mut connection = self.connection.lock().await;
        let stream = connection
            .as_mut()
            .ok_or_else(|| Error::Disconnected("not connected".to_string()))?;

        let request_id = self.next_request_id();
        let marker_id = self.next_request_id();
        let exchange = tokio::time::timeout(
            self.config.command_timeout(),
            Self::exchange(stream, request_id, marker_id, command),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Disconnected(format!(
                "no reply within {}s",
                self.config.command_timeout_secs
            )))
        });

        match exchange {
            Ok(body) => Ok(body),
            Err(e) => {
                tracing::debug!(error = %e, "Remote console exchange failed, dropping connection");
                *connection = None;
                self.store_roster(Vec::new());
                Err(match e {
                    Error::Disconnected(reason) => Error::Disconnected(reason),
                    other => Error::Disconnected(other.to_string()),
                })
            }
        }
    }

    async fn close(&self) {
        if let Some(mut stream) = self.connection.lock().await.take() {
            let _ = stream.shutdown().await;
            tracing::debug!("Remote console closed");
        }
    }

    async fn roster(&self) -> Result<Vec<PlayerRosterEntry>> {
        let response = self.send("list").await?;
        let entries = parse_roster(&response)?;
        if let Some(count) = parse_player_count(&response) {
            if count != entries.len() {
                tracing::debug!(count, parsed = entries.len(), "Roster count mismatch");
            }
        }
        self.store_roster(entries.clone());
        Ok(entries)
    }
}
