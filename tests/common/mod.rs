//! Fakes shared by the controller and admission tests.
#![allow(dead_code)]

use assert_fs::prelude::*;
use async_trait::async_trait;
use mc_steward::ServerController;
use mc_steward::error::{Error, Result};
use mc_steward::host::HostResolver;
use mc_steward::rcon::RemoteConsole;
use mc_steward::server::{
    LaunchSpec, OutputStream, ProcessHandle, ProcessId, ProcessOutput, ServerEvent,
    ServerLifecycleEvent, Supervisor, WatchdogConfig,
};
use mc_steward::world::WorldRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const DONE: &str = "[18:02:11] [Server thread/INFO]: Done (5.032s)! For help, type \"help\"";

/// Supervisor handing the test the sending side of the output stream
#[derive(Default)]
pub struct FakeSupervisor {
    output: Mutex<Option<(ProcessHandle, mpsc::UnboundedSender<ProcessOutput>)>>,
    pub spawns: AtomicUsize,
    pub kills: AtomicUsize,
}

impl FakeSupervisor {
    pub fn emit(&self, item: ProcessOutput) {
        let exited = matches!(item, ProcessOutput::Exited(_));
        let mut output = self.output.lock().unwrap();
        if let Some((_, sender)) = output.as_ref() {
            let _ = sender.send(item);
        }
        if exited {
            *output = None;
        }
    }

    pub fn line(&self, line: &str) {
        self.emit(ProcessOutput::Line(line.to_string()));
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn spawn(&self, _launch: &LaunchSpec) -> Result<(ProcessHandle, OutputStream)> {
        let mut output = self.output.lock().unwrap();
        if output.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let handle = ProcessHandle::new(ProcessId::new(), 4242);
        let (sender, receiver) = mpsc::unbounded_channel();
        *output = Some((handle, sender));
        Ok((handle, receiver))
    }

    async fn kill(&self, handle: ProcessHandle) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        let mut output = self.output.lock().unwrap();
        match output.take() {
            Some((live, sender)) if live == handle => {
                let _ = sender.send(ProcessOutput::Exited(Some(130)));
                Ok(())
            }
            other => {
                *output = other;
                Err(Error::NotRunning)
            }
        }
    }

    fn is_running(&self) -> bool {
        self.output.lock().unwrap().is_some()
    }
}

/// Console that is reachable only while `online` is set
pub struct FakeConsole {
    online: AtomicBool,
    roster: Mutex<String>,
    pub sent: Mutex<Vec<String>>,
}

impl FakeConsole {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            roster: Mutex::new("0 players online:".to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_roster(&self, response: &str) {
        *self.roster.lock().unwrap() = response.to_string();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConsole for FakeConsole {
    async fn connect(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ConnectionRefused("127.0.0.1:25575".to_string()))
        }
    }

    async fn send(&self, command: &str) -> Result<String> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Disconnected("not connected".to_string()));
        }
        self.sent.lock().unwrap().push(command.to_string());
        match command {
            "list" => Ok(self.roster.lock().unwrap().clone()),
            "stop" => {
                self.set_online(false);
                Ok("Stopping the server".to_string())
            }
            other => Ok(format!("Unknown command: {}", other)),
        }
    }

    async fn close(&self) {}
}

/// Resolver returning a fixed answer
pub struct FixedHost(pub Option<String>);

#[async_trait]
impl HostResolver for FixedHost {
    async fn resolve(&self) -> Option<String> {
        self.0.clone()
    }
}

pub struct Harness {
    pub controller: ServerController,
    pub supervisor: Arc<FakeSupervisor>,
    pub console: Arc<FakeConsole>,
    pub install: assert_fs::TempDir,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        Self::build(online, Some("play.example.org".to_string()), Duration::from_secs(30))
    }

    pub fn build(online: bool, host: Option<String>, start_timeout: Duration) -> Self {
        let install = assert_fs::TempDir::new().expect("temp dir");
        for world in ["default", "castle", "skyblock"] {
            install
                .child("worlds")
                .child(world)
                .create_dir_all()
                .expect("world dir");
        }
        install
            .child("server.properties")
            .write_str("enable-rcon=true\nlevel-name=worlds/default\n")
            .expect("properties");

        let supervisor = Arc::new(FakeSupervisor::default());
        let console = Arc::new(FakeConsole::new(online));
        let worlds = Arc::new(WorldRegistry::new(
            install.path().join("worlds"),
            "worlds",
            install.path().join("server.properties"),
        ));
        let launch = LaunchSpec {
            program: "java".to_string(),
            args: vec!["-jar".to_string(), "server.jar".to_string()],
            working_dir: PathBuf::from(install.path()),
            env: HashMap::new(),
        };

        let controller = ServerController::new(
            supervisor.clone(),
            console.clone(),
            worlds,
            Arc::new(FixedHost(host)),
            launch,
            WatchdogConfig {
                start_timeout,
                stop_timeout: start_timeout,
            },
        );

        Self {
            controller,
            supervisor,
            console,
            install,
        }
    }

    /// Start the server and confirm it, returning once the Online event is out
    pub async fn bring_online(&self) -> ServerEvent {
        let mut events = self.controller.subscribe();
        self.controller.start(None).await.expect("start");
        self.console.set_online(true);
        self.supervisor.line(DONE);
        wait_for(&mut events, ServerLifecycleEvent::Online).await
    }
}

pub async fn wait_for(
    events: &mut broadcast::Receiver<ServerEvent>,
    kind: ServerLifecycleEvent,
) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.event == kind => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {:?} event in time", kind))
}
