use mc_steward::config::{Config, HostConfig, validate_config};
use mc_steward::error::{Error, Result};
use std::io::Write;
use std::path::PathBuf;

#[test]
fn test_parse_config() -> Result<()> {
    let config_str = r#"{
        "server": {
            "installDir": "/srv/minecraft",
            "java": "/usr/lib/jvm/java-21/bin/java",
            "minMemory": "2G",
            "maxMemory": "6G",
            "extraArgs": ["-XX:+UseG1GC"],
            "env": { "TZ": "Europe/Berlin" }
        },
        "rcon": { "port": 25585, "password": "hunter2" },
        "host": { "mode": "static", "address": "play.example.org:25565" },
        "timeouts": { "startSecs": 600 }
    }"#;

    let config = Config::parse_from_str(config_str)?;

    assert_eq!(config.server.install_dir, PathBuf::from("/srv/minecraft"));
    assert_eq!(config.server.java, "/usr/lib/jvm/java-21/bin/java");
    assert_eq!(config.server.extra_args, vec!["-XX:+UseG1GC"]);
    assert_eq!(
        config.server.env.get("TZ"),
        Some(&"Europe/Berlin".to_string())
    );
    assert_eq!(config.rcon.address(), "127.0.0.1:25585");
    assert_eq!(config.timeouts.start_secs, 600);
    assert_eq!(config.timeouts.stop_secs, 120);
    assert_eq!(config.timeouts.kill_grace_secs, 30);

    Ok(())
}

#[test]
fn test_parse_tunnel_host() -> Result<()> {
    let config_str = r#"{
        "server": { "installDir": "/srv/minecraft" },
        "host": {
            "mode": "tunnel",
            "apiUrl": "http://127.0.0.1:4040/api",
            "localAddress": "localhost:25565"
        }
    }"#;

    let config = Config::parse_from_str(config_str)?;

    match config.host {
        HostConfig::Tunnel {
            api_url,
            local_address,
            protocol,
            name,
            request_timeout_secs,
        } => {
            assert_eq!(api_url, "http://127.0.0.1:4040/api");
            assert_eq!(local_address, "localhost:25565");
            assert_eq!(protocol, "tcp");
            assert_eq!(name, "minecraft");
            assert_eq!(request_timeout_secs, 5);
        }
        other => panic!("expected tunnel host, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_from_yaml_file() -> Result<()> {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("create temp file");
    writeln!(
        file,
        "server:\n  installDir: /srv/mc\n  gui: true\nrcon:\n  password: secret\nhost:\n  mode: static\n  address: mc.example.org"
    )
    .expect("write temp file");

    let config = Config::from_file(file.path())?;

    assert!(config.server.gui);
    assert_eq!(config.rcon.password, "secret");
    assert!(matches!(config.host, HostConfig::Static { .. }));

    Ok(())
}

#[test]
fn test_malformed_config() {
    let result = Config::parse_from_str(r#"{ "server": { "installDir": 3 } }"#);
    assert!(matches!(result, Err(Error::ConfigParse(_))));

    let result = Config::from_file("/definitely/not/here.json");
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_validate_config() -> Result<()> {
    let install = tempfile::tempdir().expect("create temp dir");
    let config_str = format!(
        r#"{{
            "server": {{ "installDir": {:?} }},
            "rcon": {{ "password": "hunter2" }},
            "host": {{ "mode": "tunnel", "apiUrl": "http://127.0.0.1:4040/api", "localAddress": "localhost:25565" }}
        }}"#,
        install.path().display().to_string()
    );
    let config = Config::parse_from_str(&config_str)?;

    validate_config(&config)?;

    let mut bad_memory = config.clone();
    bad_memory.server.max_memory = "lots".to_string();
    assert!(matches!(
        validate_config(&bad_memory),
        Err(Error::ConfigValidation(_))
    ));

    let mut no_password = config.clone();
    no_password.rcon.password.clear();
    assert!(validate_config(&no_password).is_err());

    assert_eq!(config.rcon.command_timeout_secs, 10);
    let mut no_command_timeout = config.clone();
    no_command_timeout.rcon.command_timeout_secs = 0;
    assert!(matches!(
        validate_config(&no_command_timeout),
        Err(Error::ConfigValidation(_))
    ));

    let mut bad_url = config.clone();
    bad_url.host = HostConfig::Tunnel {
        api_url: "not a url".to_string(),
        local_address: "localhost:25565".to_string(),
        protocol: "tcp".to_string(),
        name: "minecraft".to_string(),
        request_timeout_secs: 5,
    };
    assert!(validate_config(&bad_url).is_err());

    let mut missing_dir = config;
    missing_dir.server.install_dir = install.path().join("missing");
    assert!(validate_config(&missing_dir).is_err());

    Ok(())
}
