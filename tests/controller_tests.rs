mod common;

use common::{DONE, Harness, wait_for};
use mc_steward::error::{Error, Result};
use mc_steward::rcon::PlayerRosterEntry;
use mc_steward::server::{ProcessOutput, ServerLifecycleEvent, ServerState, Supervisor};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_start_until_online() -> Result<()> {
    let harness = Harness::new(false);
    let mut events = harness.controller.subscribe();

    assert_eq!(harness.controller.status().await?, ServerState::Offline);
    assert_eq!(
        harness.controller.start(Some("default")).await?,
        ServerState::Offline
    );
    assert_eq!(harness.supervisor.spawn_count(), 1);
    wait_for(&mut events, ServerLifecycleEvent::Starting).await;

    // The console already answers, but nothing is confirmed yet.
    harness.console.set_online(true);
    assert_eq!(harness.controller.status().await?, ServerState::Starting);

    harness
        .supervisor
        .line("[18:02:10] [Server thread/INFO]: Preparing spawn area: 97%");
    harness.supervisor.line(DONE);

    let online = wait_for(&mut events, ServerLifecycleEvent::Online).await;
    assert_eq!(online.address.as_deref(), Some("play.example.org"));
    assert_eq!(harness.controller.status().await?, ServerState::Online);

    Ok(())
}

#[tokio::test]
async fn test_start_while_online_is_noop() -> Result<()> {
    let harness = Harness::new(true);

    assert_eq!(harness.controller.start(None).await?, ServerState::Online);
    assert_eq!(harness.supervisor.spawn_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_start_while_starting_is_noop() -> Result<()> {
    let harness = Harness::new(false);

    assert_eq!(harness.controller.start(None).await?, ServerState::Offline);
    assert_eq!(harness.controller.start(None).await?, ServerState::Starting);
    assert_eq!(harness.supervisor.spawn_count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_start_with_unknown_world() -> Result<()> {
    let harness = Harness::new(false);

    let result = harness.controller.start(Some("atlantis")).await;

    assert!(matches!(result, Err(Error::InvalidWorld(_))));
    assert_eq!(harness.supervisor.spawn_count(), 0);
    assert_eq!(harness.controller.status().await?, ServerState::Offline);
    assert_eq!(harness.controller.active_world()?, "default");

    Ok(())
}

#[tokio::test]
async fn test_start_switches_world() -> Result<()> {
    let harness = Harness::new(false);

    harness.controller.start(Some("castle")).await?;

    assert_eq!(harness.controller.active_world()?, "castle");
    Ok(())
}

#[tokio::test]
async fn test_stop_from_online() -> Result<()> {
    let harness = Harness::new(false);
    harness.bring_online().await;
    let mut events = harness.controller.subscribe();

    assert_eq!(harness.controller.stop().await?, ServerState::Online);

    assert!(harness.console.sent().contains(&"stop".to_string()));
    assert_eq!(harness.supervisor.kills.load(Ordering::SeqCst), 1);
    wait_for(&mut events, ServerLifecycleEvent::Offline).await;
    assert_eq!(harness.controller.status().await?, ServerState::Offline);

    // Double stop does nothing.
    assert_eq!(harness.controller.stop().await?, ServerState::Offline);
    assert_eq!(harness.supervisor.kills.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_while_starting_is_noop() -> Result<()> {
    let harness = Harness::new(false);
    harness.controller.start(None).await?;

    assert_eq!(harness.controller.stop().await?, ServerState::Starting);
    assert!(harness.console.sent().is_empty());
    assert_eq!(harness.supervisor.kills.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_roster_only_when_online() -> Result<()> {
    let harness = Harness::new(false);
    harness
        .console
        .set_roster("2 players online: Alice (id1) Bob (id2)");

    assert!(harness.controller.player_roster().await.is_empty());

    harness.controller.start(None).await?;
    harness.console.set_online(true);
    assert!(harness.controller.player_roster().await.is_empty());

    let mut events = harness.controller.subscribe();
    harness.supervisor.line(DONE);
    wait_for(&mut events, ServerLifecycleEvent::Online).await;

    assert_eq!(
        harness.controller.player_roster().await,
        vec![
            PlayerRosterEntry::new("Alice", "id1"),
            PlayerRosterEntry::new("Bob", "id2"),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_fatal_output_is_reported_once() -> Result<()> {
    let harness = Harness::new(false);
    let mut events = harness.controller.subscribe();
    harness.controller.start(None).await?;

    harness
        .supervisor
        .emit(ProcessOutput::Fatal("Error: Unable to access jarfile server.jar".to_string()));
    let fatal = wait_for(&mut events, ServerLifecycleEvent::Fatal).await;
    assert!(fatal.description.contains("Unable to access jarfile"));

    match harness.controller.status().await {
        Err(Error::FatalStartup(line)) => {
            assert_eq!(line, "Error: Unable to access jarfile server.jar")
        }
        other => panic!("expected fatal startup, got {:?}", other),
    }
    // Still reaping the killed process.
    assert_eq!(harness.controller.status().await?, ServerState::Starting);

    harness.supervisor.emit(ProcessOutput::Exited(Some(137)));
    wait_for(&mut events, ServerLifecycleEvent::Offline).await;
    assert_eq!(harness.controller.status().await?, ServerState::Offline);

    Ok(())
}

#[tokio::test]
async fn test_stopping_during_startup() -> Result<()> {
    let harness = Harness::new(false);
    let mut events = harness.controller.subscribe();
    harness.controller.start(None).await?;

    harness
        .supervisor
        .line("[18:02:11] [Server thread/INFO]: Stopping server");
    let stopped = wait_for(&mut events, ServerLifecycleEvent::Offline).await;
    assert_eq!(stopped.description, "Server stopped during startup");

    harness.supervisor.emit(ProcessOutput::Exited(Some(0)));
    wait_for(&mut events, ServerLifecycleEvent::Offline).await;
    assert_eq!(harness.controller.status().await?, ServerState::Offline);
    Ok(())
}

#[tokio::test]
async fn test_exit_during_startup() -> Result<()> {
    let harness = Harness::new(false);
    let mut events = harness.controller.subscribe();
    harness.controller.start(None).await?;

    harness.supervisor.emit(ProcessOutput::Exited(Some(1)));
    wait_for(&mut events, ServerLifecycleEvent::Offline).await;

    assert_eq!(harness.controller.status().await?, ServerState::Offline);
    assert_eq!(harness.controller.start(None).await?, ServerState::Offline);
    assert_eq!(harness.supervisor.spawn_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_unconfirmed_start_times_out() -> Result<()> {
    let harness = Harness::build(false, None, Duration::from_millis(50));
    let mut events = harness.controller.subscribe();
    harness.controller.start(None).await?;
    harness.console.set_online(true);

    let timed_out = wait_for(&mut events, ServerLifecycleEvent::TimedOut).await;

    assert!(timed_out.description.contains("online"));
    assert_eq!(harness.controller.status().await?, ServerState::Online);
    Ok(())
}

#[tokio::test]
async fn test_slow_boot_keeps_world_after_timeout() -> Result<()> {
    let harness = Harness::build(false, None, Duration::from_millis(50));
    let mut events = harness.controller.subscribe();
    harness.controller.start(Some("castle")).await?;

    let timed_out = wait_for(&mut events, ServerLifecycleEvent::TimedOut).await;
    assert!(timed_out.description.contains("starting"));
    assert!(harness.supervisor.is_running());

    assert_eq!(harness.controller.status().await?, ServerState::Starting);
    assert_eq!(
        harness.controller.start(Some("skyblock")).await?,
        ServerState::Starting
    );
    assert!(matches!(
        harness.controller.set_world("skyblock").await,
        Err(Error::Busy(ServerState::Starting))
    ));
    assert_eq!(harness.controller.active_world()?, "castle");
    assert_eq!(harness.supervisor.spawn_count(), 1);

    // The late confirmation still brings the server up.
    harness.console.set_online(true);
    harness.supervisor.line(DONE);
    wait_for(&mut events, ServerLifecycleEvent::Online).await;
    assert_eq!(harness.controller.status().await?, ServerState::Online);

    Ok(())
}

#[tokio::test]
async fn test_confirmed_start_disarms_watchdog() -> Result<()> {
    let harness = Harness::build(false, None, Duration::from_millis(100));
    harness.bring_online().await;
    let mut events = harness.controller.subscribe();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
    Ok(())
}

#[tokio::test]
async fn test_host_unavailable_does_not_block() -> Result<()> {
    let harness = Harness::build(false, None, Duration::from_secs(30));

    let online = harness.bring_online().await;

    assert_eq!(online.address, None);
    assert_eq!(harness.controller.host().await, None);
    assert_eq!(harness.controller.status().await?, ServerState::Online);
    Ok(())
}

#[tokio::test]
async fn test_set_world_only_when_offline() -> Result<()> {
    let harness = Harness::new(false);

    assert_eq!(harness.controller.set_world("skyblock").await?, "skyblock");
    assert_eq!(harness.controller.active_world()?, "skyblock");
    assert!(matches!(
        harness.controller.set_world("nowhere").await,
        Err(Error::InvalidWorld(_))
    ));

    harness.controller.start(None).await?;
    assert!(matches!(
        harness.controller.set_world("castle").await,
        Err(Error::Busy(ServerState::Starting))
    ));
    assert_eq!(harness.controller.active_world()?, "skyblock");

    Ok(())
}

#[tokio::test]
async fn test_player_events() -> Result<()> {
    let harness = Harness::new(false);
    harness.bring_online().await;
    let mut events = harness.controller.subscribe();

    harness
        .supervisor
        .line("[18:05:00] [Server thread/INFO]: Alice joined the game");
    let joined = wait_for(&mut events, ServerLifecycleEvent::PlayerJoined).await;
    assert_eq!(joined.description, "Alice joined");

    harness
        .supervisor
        .line("[18:06:00] [Server thread/INFO]: Alice left the game");
    let left = wait_for(&mut events, ServerLifecycleEvent::PlayerLeft).await;
    assert_eq!(left.description, "Alice left");

    let history = harness.controller.events().get_events(Some(1))?;
    assert_eq!(history[0].event, ServerLifecycleEvent::PlayerLeft);
    Ok(())
}

#[tokio::test]
async fn test_available_worlds() -> Result<()> {
    let harness = Harness::new(false);

    let worlds: Vec<String> = harness.controller.available_worlds()?.into_iter().collect();

    assert_eq!(worlds, vec!["castle", "default", "skyblock"]);
    Ok(())
}
