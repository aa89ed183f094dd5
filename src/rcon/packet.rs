use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Login request
pub const PACKET_LOGIN: i32 = 3;
/// Command request
pub const PACKET_COMMAND: i32 = 2;
/// Login response; shares its value with [`PACKET_COMMAND`]
pub const PACKET_AUTH_RESPONSE: i32 = 2;
/// Command response
pub const PACKET_RESPONSE: i32 = 0;

/// Request id the server answers a rejected login with
pub const AUTH_FAILED_ID: i32 = -1;

/// Largest body the server sends in one packet
pub const MAX_BODY_LEN: usize = 4096;

// id + type + two trailing NULs
const HEADER_LEN: usize = 4 + 4 + 2;

/// One RCON frame.
///
/// On the wire: `i32 length`, `i32 request id`, `i32 type`, body bytes, two
/// NUL bytes, all integers little-endian. `length` counts everything after
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(request_id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    pub fn login(request_id: i32, password: &str) -> Self {
        Self::new(request_id, PACKET_LOGIN, password)
    }

    pub fn command(request_id: i32, command: &str) -> Self {
        Self::new(request_id, PACKET_COMMAND, command)
    }

    /// Serialize including the length prefix
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = (HEADER_LEN + body.len()) as i32;
        let mut frame = Vec::with_capacity(4 + HEADER_LEN + body.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&self.request_id.to_le_bytes());
        frame.extend_from_slice(&self.kind.to_le_bytes());
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0, 0]);
        frame
    }

    /// Parse the bytes that follow the length prefix
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < HEADER_LEN {
            return Err(Error::Protocol(format!(
                "frame of {} bytes is shorter than the header",
                payload.len()
            )));
        }

        let request_id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body = &payload[8..payload.len() - 2];
        if payload[payload.len() - 2..] != [0, 0] {
            return Err(Error::Protocol("frame is not NUL-terminated".to_string()));
        }

        Ok(Self {
            request_id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    /// Write one frame
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(&self.encode())
            .await
            .map_err(|e| Error::Disconnected(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Disconnected(format!("flush failed: {}", e)))
    }

    /// Read one frame
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let length = reader
            .read_i32_le()
            .await
            .map_err(|e| Error::Disconnected(format!("read failed: {}", e)))?;

        let length = usize::try_from(length)
            .ok()
            .filter(|len| (HEADER_LEN..=HEADER_LEN + MAX_BODY_LEN).contains(len))
            .ok_or_else(|| Error::Protocol(format!("invalid frame length {}", length)))?;

        let mut payload = vec![0u8; length];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::Disconnected(format!("read failed: {}", e)))?;

        Self::decode(&payload)
    }
}
