use crate::config::{Config, HostConfig, RconConfig, ServerConfig};
use crate::error::{Error, Result};

/// Checks a heap size of the form `<digits>[KkMmGg]`, as accepted by `-Xms`/`-Xmx`.
pub fn is_valid_memory_size(value: &str) -> bool {
    let digits = value.trim_end_matches(['K', 'k', 'M', 'm', 'G', 'g']);
    let suffix_len = value.len() - digits.len();
    !digits.is_empty() && suffix_len <= 1 && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Validates the server launch section
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.java.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server has empty java command".to_string()));
    }

    if config.jar.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server has empty jar".to_string()));
    }

    for (name, value) in [("minMemory", &config.min_memory), ("maxMemory", &config.max_memory)] {
        if !is_valid_memory_size(value) {
            return Err(Error::ConfigValidation(format!(
                "{} '{}' is not a memory size like 1024M or 4G",
                name, value
            )));
        }
    }

    if !config.install_dir.is_dir() {
        return Err(Error::ConfigValidation(format!(
            "Install directory '{}' does not exist",
            config.install_dir.display()
        )));
    }

    Ok(())
}

/// Validates the remote console section
pub fn validate_rcon_config(config: &RconConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(Error::ConfigValidation("RCON host is empty".to_string()));
    }
    if config.port == 0 {
        return Err(Error::ConfigValidation("RCON port must not be 0".to_string()));
    }
    if config.password.is_empty() {
        return Err(Error::ConfigValidation("RCON password is empty".to_string()));
    }
    if config.connect_timeout_secs == 0 || config.command_timeout_secs == 0 {
        return Err(Error::ConfigValidation(
            "RCON timeouts must be at least one second".to_string(),
        ));
    }
    Ok(())
}

/// Validates the host section
pub fn validate_host_config(config: &HostConfig) -> Result<()> {
    match config {
        HostConfig::Static { address } => {
            if address.trim().is_empty() {
                return Err(Error::ConfigInvalid("Static host address is empty".to_string()));
            }
        }
        HostConfig::Tunnel {
            api_url,
            local_address,
            ..
        } => {
            reqwest::Url::parse(api_url).map_err(|e| {
                Error::ConfigValidation(format!("Tunnel API URL '{}' is invalid: {}", api_url, e))
            })?;
            if local_address.trim().is_empty() {
                return Err(Error::ConfigInvalid(
                    "Tunnel local address is empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_rcon_config(&config.rcon)?;
    validate_host_config(&config.host)?;

    if config.timeouts.start_secs == 0 || config.timeouts.stop_secs == 0 {
        return Err(Error::ConfigValidation(
            "Transition timeouts must be at least one second".to_string(),
        ));
    }

    Ok(())
}
