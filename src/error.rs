/// Error handling module for mc-steward.
///
/// This module defines the error types used throughout the library.
/// Errors fall into four groups: transient console failures that callers
/// normally fold into [`ServerState::Offline`], configuration problems that
/// abort the requested operation, external-service failures that degrade
/// host resolution, and fatal process failures that need an operator.
///
/// # Example
///
/// ```
/// use mc_steward::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::InvalidWorld(name)) => println!("World '{}' does not exist", name),
///         Err(Error::FatalStartup(line)) => println!("Server crashed: {}", line),
///         Err(e) if e.is_transient() => println!("Server not reachable yet: {}", e),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use crate::server::ServerState;
use thiserror::Error;

/// Errors that can occur in the mc-steward library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Required fields are missing
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parses but is unusable as a whole.
    ///
    /// This error occurs when:
    /// - The launch command or jar is empty
    /// - The host section selects a tunnel without an API URL
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Configuration is valid but contains values that fail validation checks.
    ///
    /// This error occurs when:
    /// - The install directory doesn't exist
    /// - A memory size isn't of the form `<digits>[KMG]`
    /// - The RCON port is zero or the password is empty
    #[error("Config validation error: {0}")]
    ConfigValidation(String),

    /// Error when spawning, signalling or reading from the server process.
    #[error("Server process error: {0}")]
    Process(String),

    /// A server process is already live.
    ///
    /// This error occurs when:
    /// - `spawn` is called while a previous process has not exited
    #[error("Already running")]
    AlreadyRunning,

    /// No server process is live.
    ///
    /// This error occurs when:
    /// - Attempting to kill a process that has already exited
    #[error("Not running")]
    NotRunning,

    /// The server process wrote to its error stream and was force-killed.
    ///
    /// The install is assumed to be corrupted or misconfigured; nothing retries.
    #[error("Server failed during startup: {0}")]
    FatalStartup(String),

    /// The remote console refused the connection.
    ///
    /// Expected while the server is offline or still booting.
    #[error("Remote console connection refused: {0}")]
    ConnectionRefused(String),

    /// The remote console connection was lost or never established.
    #[error("Remote console disconnected: {0}")]
    Disconnected(String),

    /// The remote console rejected the configured password.
    #[error("Remote console authentication failed")]
    Authentication,

    /// The remote console sent a frame that violates the protocol.
    #[error("Remote console protocol error: {0}")]
    Protocol(String),

    /// Requested world is not a directory under the world root.
    #[error("Invalid world: {0}")]
    InvalidWorld(String),

    /// The server property file could not be read or written.
    #[error("Property file error: {0}")]
    PropertyFile(String),

    /// The operation needs an offline server but the server is in another state.
    #[error("Server is busy ({0})")]
    Busy(ServerState),

    /// The tunneling service was unreachable or answered with an error.
    #[error("Tunnel service error: {0}")]
    Tunnel(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns true for errors that only mean "the server is not reachable right now".
    ///
    /// These are represented as state by the controller and never logged as errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ConnectionRefused(_) | Error::Disconnected(_) | Error::Timeout(_)
        )
    }
}

/// Result type for mc-steward operations.
pub type Result<T> = std::result::Result<T, Error>;
