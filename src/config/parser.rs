use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the Minecraft server process is launched and where its data lives.
///
/// # Examples
///
/// ```
/// use mc_steward::config::ServerConfig;
/// use std::path::PathBuf;
///
/// let server = ServerConfig {
///     install_dir: PathBuf::from("/srv/minecraft"),
///     max_memory: "4G".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(server.jar, "server.jar");
/// assert!(!server.gui);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Server install directory, used as the working directory of the process.
    pub install_dir: PathBuf,

    /// Java executable. An absolute path or a command available in the PATH.
    pub java: String,

    /// Server jar, relative to the install directory.
    pub jar: String,

    /// Initial heap size passed as `-Xms`.
    pub min_memory: String,

    /// Maximum heap size passed as `-Xmx`.
    pub max_memory: String,

    /// Extra JVM arguments inserted before `-jar`.
    pub extra_args: Vec<String>,

    /// Run the server with its own GUI window. When false `nogui` is appended.
    pub gui: bool,

    /// Property file, relative to the install directory.
    pub properties_file: PathBuf,

    /// Directory holding one sub-directory per world, relative to the install directory.
    pub world_root: PathBuf,

    /// Environment variables to set when launching the server.
    pub env: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("."),
            java: "java".to_string(),
            jar: "server.jar".to_string(),
            min_memory: "1G".to_string(),
            max_memory: "2G".to_string(),
            extra_args: Vec::new(),
            gui: false,
            properties_file: PathBuf::from("server.properties"),
            world_root: PathBuf::from("worlds"),
            env: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Absolute path of the property file.
    pub fn properties_path(&self) -> PathBuf {
        self.install_dir.join(&self.properties_file)
    }

    /// Absolute path of the world root.
    pub fn world_root_path(&self) -> PathBuf {
        self.install_dir.join(&self.world_root)
    }
}

/// Remote console (RCON) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Upper bound on connecting and logging in, in seconds.
    pub connect_timeout_secs: u64,
    /// Upper bound on one command and its full reply, in seconds.
    pub command_timeout_secs: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25575,
            password: String::new(),
            connect_timeout_secs: 5,
            command_timeout_secs: 10,
        }
    }
}

impl RconConfig {
    /// `host:port` string suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Where players should connect.
///
/// # JSON Schema
///
/// ```json
/// { "mode": "static", "address": "play.example.org:25565" }
/// ```
///
/// ```json
/// {
///   "mode": "tunnel",
///   "apiUrl": "http://127.0.0.1:4040/api",
///   "localAddress": "localhost:25565",
///   "protocol": "tcp",
///   "name": "minecraft"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum HostConfig {
    /// A fixed address, returned unconditionally.
    Static { address: String },
    /// An address obtained from a local tunneling agent.
    #[serde(rename_all = "camelCase")]
    Tunnel {
        api_url: String,
        local_address: String,
        #[serde(default = "default_tunnel_protocol")]
        protocol: String,
        #[serde(default = "default_tunnel_name")]
        name: String,
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
    },
}

fn default_tunnel_protocol() -> String {
    "tcp".to_string()
}

fn default_tunnel_name() -> String {
    "minecraft".to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

/// Bounds on state transitions, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutConfig {
    /// How long a start may stay unconfirmed before falling back to a console probe.
    pub start_secs: u64,
    /// How long a stop may stay unconfirmed before falling back to a console probe.
    pub stop_secs: u64,
    /// How long the process gets after an interrupt before it is killed outright.
    pub kill_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            start_secs: 300,
            stop_secs: 120,
            kill_grace_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

/// Main configuration for mc-steward.
///
/// # JSON Schema
///
/// ```json
/// {
///   "server": {
///     "installDir": "/srv/minecraft",
///     "minMemory": "1G",
///     "maxMemory": "4G",
///     "worldRoot": "worlds"
///   },
///   "rcon": { "port": 25575, "password": "hunter2" },
///   "host": { "mode": "static", "address": "play.example.org" },
///   "timeouts": { "startSecs": 300 }
/// }
/// ```
///
/// # Examples
///
/// ```no_run
/// use mc_steward::config::Config;
///
/// let config = Config::from_file("steward.json").unwrap();
/// println!("Server lives in {}", config.server.install_dir.display());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub rcon: RconConfig,
    pub host: HostConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yml` or `.yaml` are parsed as YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));

        if is_yaml {
            Self::parse_from_yaml_str(&content)
        } else {
            Self::parse_from_str(&content)
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }
}
