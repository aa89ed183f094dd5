use anyhow::Context;
use mc_steward::config::validate_config;
use mc_steward::{Config, ServerController, ServerState};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG picks the level; STEWARD_LOG_DIR switches to a daily log file.
    let _guard = match std::env::var_os("STEWARD_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "steward.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_target(true)
                .init();
            None
        }
    };

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "demos/steward.yaml".to_string());
    let world = args.next();

    let config = Config::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    validate_config(&config)?;

    let controller = ServerController::from_config(&config)?;
    println!("Worlds: {:?}", controller.available_worlds()?);

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event.address {
                Some(address) => println!("[{:?}] {} ({})", event.event, event.description, address),
                None => println!("[{:?}] {}", event.event, event.description),
            }
        }
    });

    match controller.start(world.as_deref()).await? {
        ServerState::Offline => println!("Starting {}", controller.active_world()?),
        other => println!("Server already {}", other),
    }

    tokio::signal::ctrl_c().await?;
    println!("Stopping...");
    controller.stop().await?;
    println!("Status: {}", controller.status().await?);

    Ok(())
}
