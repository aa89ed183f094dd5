//! The server state machine.
//!
//! [`ServerController`] composes the process supervisor, the remote console,
//! the world registry and the host resolver. Every transition, and every
//! event derived from server output, is applied under one async mutex.
use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{HostResolver, resolver_from_config};
use crate::rcon::{PlayerRosterEntry, RconSession, RemoteConsole};
use crate::server::{
    LaunchSpec, LogEvent, OutputStream, ProcessHandle, ProcessOutput, ProcessSupervisor,
    ServerEvent, ServerLifecycleEvent, ServerLifecycleManager, ServerState, Supervisor,
    TransitionWatchdog, WatchdogConfig, classify_line,
};
use crate::world::WorldRegistry;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionKind {
    Start,
    Stop,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Start => f.write_str("start"),
            TransitionKind::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    kind: TransitionKind,
    generation: u64,
}

/// Everything guarded by the controller mutex
#[derive(Default)]
struct ControllerState {
    transition: Option<Transition>,
    process: Option<ProcessHandle>,
    /// Fatal output not yet reported through `status`
    pending_failure: Option<String>,
    generation: u64,
    watchdog: TransitionWatchdog,
}

impl ControllerState {
    fn begin(&mut self, kind: TransitionKind) -> u64 {
        self.generation += 1;
        self.transition = Some(Transition {
            kind,
            generation: self.generation,
        });
        self.generation
    }

    fn in_flight(&self) -> Option<TransitionKind> {
        self.transition.map(|t| t.kind)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.transition.is_some_and(|t| t.generation == generation)
    }

    fn finish(&mut self) {
        self.transition = None;
        self.watchdog.disarm();
    }
}

struct Inner {
    state: Mutex<ControllerState>,
    supervisor: Arc<dyn Supervisor>,
    console: Arc<dyn RemoteConsole>,
    worlds: Arc<WorldRegistry>,
    resolver: Arc<dyn HostResolver>,
    events: Arc<ServerLifecycleManager>,
    launch: LaunchSpec,
    timeouts: WatchdogConfig,
}

impl Inner {
    fn notify(&self, event: ServerLifecycleEvent, description: impl Into<String>) {
        if let Err(e) = self.events.record_event(event, description, None) {
            tracing::warn!(error = %e, "Failed to record lifecycle event");
        }
    }

    /// Current state without consuming a pending failure
    async fn probe(&self, state: &ControllerState) -> ServerState {
        if state.in_flight().is_some() {
            return ServerState::Starting;
        }

        let reachable = match self.console.connect().await {
            Ok(()) => self.console.roster().await.map(|_| ()),
            Err(e) => Err(e),
        };

        match reachable {
            Ok(()) => ServerState::Online,
            Err(e) => {
                if e.is_transient() {
                    tracing::debug!(error = %e, "Console probe failed");
                } else {
                    tracing::warn!(error = %e, "Console probe failed");
                }
                // The tracked process has not exited yet.
                if state.process.is_some() {
                    ServerState::Starting
                } else {
                    ServerState::Offline
                }
            }
        }
    }

    fn arm_watchdog(
        self: &Arc<Self>,
        state: &mut ControllerState,
        kind: TransitionKind,
        generation: u64,
    ) {
        let timeout = match kind {
            TransitionKind::Start => self.timeouts.start_timeout,
            TransitionKind::Stop => self.timeouts.stop_timeout,
        };
        let inner: Weak<Self> = Arc::downgrade(self);
        state.watchdog.arm(timeout, move || async move {
            if let Some(inner) = inner.upgrade() {
                inner.expire(generation).await;
            }
        });
    }

    async fn expire(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if !state.is_current(generation) {
            return;
        }
        // Running inside the watchdog task: forget it rather than abort it.
        state.watchdog.release();
        let kind = state.in_flight();
        state.transition = None;

        let observed = self.probe(&state).await;
        if let Some(kind) = kind {
            tracing::warn!(%kind, %observed, "Transition not confirmed in time");
            self.notify(
                ServerLifecycleEvent::TimedOut,
                format!("Server {} not confirmed in time, server is {}", kind, observed),
            );
        }
    }

    fn announce_online(&self) {
        let resolver = Arc::clone(&self.resolver);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let address = resolver.resolve().await;
            let description = match &address {
                Some(address) => format!("Server is online at {}", address),
                None => "Server is online, host unavailable".to_string(),
            };
            if let Err(e) =
                events.record_event(ServerLifecycleEvent::Online, description, address)
            {
                tracing::warn!(error = %e, "Failed to record lifecycle event");
            }
        });
    }

    async fn apply(&self, handle: ProcessHandle, output: ProcessOutput) {
        let mut state = self.state.lock().await;
        if state.process != Some(handle) {
            tracing::trace!(process_id = %handle.id(), "Ignoring output of untracked process");
            return;
        }

        match output {
            ProcessOutput::Line(line) => match classify_line(&line) {
                Some(LogEvent::StartupComplete) => match state.in_flight() {
                    Some(TransitionKind::Start) => {
                        state.finish();
                        tracing::info!("Server startup complete");
                        self.announce_online();
                    }
                    Some(TransitionKind::Stop) => {}
                    None => {
                        tracing::info!("Server startup completed after the watchdog fired");
                        self.announce_online();
                    }
                },
                Some(LogEvent::Stopped) => match state.in_flight() {
                    Some(TransitionKind::Start) => {
                        state.finish();
                        tracing::info!("Server stopped during startup");
                        self.notify(ServerLifecycleEvent::Offline, "Server stopped during startup");
                    }
                    Some(TransitionKind::Stop) => {}
                    None => {
                        tracing::info!("Server is stopping");
                        self.notify(ServerLifecycleEvent::Stopping, "Server is stopping");
                    }
                },
                Some(LogEvent::PlayerJoined(name)) => {
                    self.notify(ServerLifecycleEvent::PlayerJoined, format!("{} joined", name));
                }
                Some(LogEvent::PlayerLeft(name)) => {
                    self.notify(ServerLifecycleEvent::PlayerLeft, format!("{} left", name));
                }
                None => {}
            },
            ProcessOutput::Fatal(line) => {
                tracing::error!(line = %line, "Server process failed");
                if state.in_flight().is_some() {
                    state.finish();
                }
                state.pending_failure = Some(line.clone());
                self.console.close().await;
                self.notify(
                    ServerLifecycleEvent::Fatal,
                    format!("Server failed and was killed: {}", line),
                );
            }
            ProcessOutput::Exited(code) => {
                state.process = None;
                match state.in_flight() {
                    Some(TransitionKind::Stop) => {}
                    Some(TransitionKind::Start) => {
                        state.finish();
                        self.notify(
                            ServerLifecycleEvent::Offline,
                            format!("Server exited during startup (code {:?})", code),
                        );
                    }
                    None => {
                        self.notify(
                            ServerLifecycleEvent::Offline,
                            format!("Server process exited (code {:?})", code),
                        );
                    }
                }
            }
        }
    }
}

async fn pump_output(inner: Arc<Inner>, handle: ProcessHandle, mut output: OutputStream) {
    while let Some(item) = output.recv().await {
        inner.apply(handle, item).await;
    }
    tracing::debug!(process_id = %handle.id(), "Server output closed");
}

/// Drives one game server through Offline, Starting and Online.
///
/// The controller is cheap to clone; clones share the same server. State is
/// never stored: [`status`](Self::status) reports Starting while a transition
/// is in flight and otherwise probes the remote console. A process that is
/// still alive but whose console does not answer counts as Starting.
///
/// Every transition arms a watchdog. If the confirming log line never
/// arrives, the transition is dropped when the watchdog fires and the next
/// probe decides the state.
///
/// # Example
///
/// ```no_run
/// use mc_steward::config::Config;
/// use mc_steward::controller::ServerController;
/// use mc_steward::server::ServerState;
///
/// #[tokio::main]
/// async fn main() -> mc_steward::Result<()> {
///     let config = Config::from_file("steward.yaml")?;
///     let controller = ServerController::from_config(&config)?;
///
///     match controller.start(Some("castle")).await? {
///         ServerState::Offline => println!("Starting..."),
///         ServerState::Starting => println!("Already starting"),
///         ServerState::Online => println!("Already running"),
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ServerController {
    inner: Arc<Inner>,
}

impl ServerController {
    /// Assemble a controller from its collaborators
    pub fn new(
        supervisor: Arc<dyn Supervisor>,
        console: Arc<dyn RemoteConsole>,
        worlds: Arc<WorldRegistry>,
        resolver: Arc<dyn HostResolver>,
        launch: LaunchSpec,
        timeouts: WatchdogConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ControllerState::default()),
                supervisor,
                console,
                worlds,
                resolver,
                events: Arc::new(ServerLifecycleManager::new()),
                launch,
                timeouts,
            }),
        }
    }

    /// Build the real process supervisor, RCON session, registry and resolver from `config`
    #[tracing::instrument(skip(config), fields(install_dir = %config.server.install_dir.display()))]
    pub fn from_config(config: &Config) -> Result<Self> {
        tracing::info!("Creating server controller");
        Ok(Self::new(
            Arc::new(ProcessSupervisor::new(config.timeouts.kill_grace())),
            Arc::new(RconSession::new(config.rcon.clone())),
            Arc::new(WorldRegistry::from_config(&config.server)),
            resolver_from_config(&config.host)?,
            LaunchSpec::from_server_config(&config.server),
            config.timeouts.clone().into(),
        ))
    }

    /// Lifecycle notifier for this server
    pub fn events(&self) -> &Arc<ServerLifecycleManager> {
        &self.inner.events
    }

    /// Shortcut for `events().subscribe()`
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    pub fn worlds(&self) -> &Arc<WorldRegistry> {
        &self.inner.worlds
    }

    /// Current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FatalStartup`] once after the server process wrote to
    /// its error stream and was killed. Later calls report the state again.
    #[tracing::instrument(skip(self))]
    pub async fn status(&self) -> Result<ServerState> {
        let mut state = self.inner.state.lock().await;
        if let Some(line) = state.pending_failure.take() {
            return Err(Error::FatalStartup(line));
        }
        Ok(self.inner.probe(&state).await)
    }

    /// Current state, leaving any pending failure for [`status`](Self::status)
    pub async fn state(&self) -> ServerState {
        let state = self.inner.state.lock().await;
        self.inner.probe(&state).await
    }

    /// Start the server, switching to `world` first when given.
    ///
    /// Returns the state observed before acting: `Offline` means the server
    /// is now starting, `Starting` and `Online` mean nothing was done.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidWorld`] if `world` does not exist; nothing is spawned
    /// * Any error from spawning the process
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, world: Option<&str>) -> Result<ServerState> {
        let mut state = self.inner.state.lock().await;
        let current = self.inner.probe(&state).await;
        if current != ServerState::Offline {
            tracing::info!(%current, "Start ignored");
            return Ok(current);
        }

        if self.inner.supervisor.is_running() {
            tracing::warn!("Start ignored, an untracked server process is still running");
            return Ok(ServerState::Starting);
        }

        if let Some(world) = world {
            self.inner.worlds.set_active(world)?;
        }

        let generation = state.begin(TransitionKind::Start);
        let (handle, output) = match self.inner.supervisor.spawn(&self.inner.launch).await {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn server process");
                state.transition = None;
                return Err(e);
            }
        };

        state.process = Some(handle);
        state.pending_failure = None;
        tokio::spawn(pump_output(Arc::clone(&self.inner), handle, output));
        self.inner
            .arm_watchdog(&mut state, TransitionKind::Start, generation);

        tracing::info!(process_id = %handle.id(), "Server starting");
        self.inner
            .notify(ServerLifecycleEvent::Starting, "Server is starting");
        Ok(current)
    }

    /// Stop an online server.
    ///
    /// Sends `stop` over the console, closes the console and interrupts the
    /// process. The controller lock is released meanwhile, so concurrent
    /// `status` calls report Starting. Returns the state observed before
    /// acting; only `Online` means a stop was performed.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<ServerState> {
        let (handle, generation) = {
            let mut state = self.inner.state.lock().await;
            let current = self.inner.probe(&state).await;
            if current != ServerState::Online {
                tracing::info!(%current, "Stop ignored");
                return Ok(current);
            }

            let generation = state.begin(TransitionKind::Stop);
            self.inner
                .arm_watchdog(&mut state, TransitionKind::Stop, generation);
            self.inner
                .notify(ServerLifecycleEvent::Stopping, "Server is stopping");
            (state.process, generation)
        };

        if let Err(e) = self.inner.console.send("stop").await {
            tracing::warn!(error = %e, "Console stop failed, relying on interrupt");
        }
        self.inner.console.close().await;

        let mut stopped = true;
        if let Some(handle) = handle {
            match self.inner.supervisor.kill(handle).await {
                Ok(()) | Err(Error::NotRunning) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to stop server process");
                    stopped = false;
                }
            }
        }

        let mut state = self.inner.state.lock().await;
        if state.is_current(generation) {
            state.finish();
        }
        if stopped {
            if state.process == handle {
                state.process = None;
            }
            tracing::info!("Server stopped");
            self.inner.notify(ServerLifecycleEvent::Offline, "Server stopped");
        }
        Ok(ServerState::Online)
    }

    /// Players currently online; empty unless the server is Online.
    #[tracing::instrument(skip(self))]
    pub async fn player_roster(&self) -> Vec<PlayerRosterEntry> {
        let state = self.inner.state.lock().await;
        if state.in_flight().is_some() {
            return Vec::new();
        }

        if let Err(e) = self.inner.console.connect().await {
            tracing::debug!(error = %e, "Roster unavailable");
            return Vec::new();
        }
        match self.inner.console.roster().await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::debug!(error = %e, "Roster unavailable");
                Vec::new()
            }
        }
    }

    /// Change the active world. Only accepted while the server is Offline.
    ///
    /// # Errors
    ///
    /// * [`Error::Busy`] with the current state when not Offline
    /// * [`Error::InvalidWorld`] if the world does not exist
    #[tracing::instrument(skip(self))]
    pub async fn set_world(&self, world: &str) -> Result<String> {
        let state = self.inner.state.lock().await;
        let current = self.inner.probe(&state).await;
        if current != ServerState::Offline {
            return Err(Error::Busy(current));
        }
        self.inner.worlds.set_active(world)
    }

    /// World named by the property file
    pub fn active_world(&self) -> Result<String> {
        self.inner.worlds.get_active()
    }

    pub fn available_worlds(&self) -> Result<BTreeSet<String>> {
        self.inner.worlds.list_available()
    }

    /// Where players connect, or `None` when the host is unavailable
    pub async fn host(&self) -> Option<String> {
        self.inner.resolver.resolve().await
    }
}
