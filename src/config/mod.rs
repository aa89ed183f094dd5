//! Configuration module for mc-steward.
//!
//! This module handles parsing, validation, and access to the settings that
//! describe the supervised server: how to launch it, how to reach its remote
//! console, where players connect, and how long transitions may take.
//! Configurations load from JSON or YAML files or strings.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use mc_steward::config::{Config, validate_config};
//!
//! let config = Config::from_file("steward.yaml").unwrap();
//! validate_config(&config).unwrap();
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use mc_steward::config::{Config, HostConfig, RconConfig, ServerConfig, TimeoutConfig};
//!
//! let config = Config {
//!     server: ServerConfig::default(),
//!     rcon: RconConfig {
//!         password: "hunter2".to_string(),
//!         ..RconConfig::default()
//!     },
//!     host: HostConfig::Static {
//!         address: "play.example.org".to_string(),
//!     },
//!     timeouts: TimeoutConfig::default(),
//! };
//! assert_eq!(config.rcon.address(), "127.0.0.1:25575");
//! ```
mod parser;
pub mod validator;

pub use parser::{Config, HostConfig, RconConfig, ServerConfig, TimeoutConfig};
pub use validator::validate_config;
