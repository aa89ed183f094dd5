// src/server/process.rs
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_process::{Child, Command, Stdio};
use async_trait::async_trait;
use futures_lite::StreamExt;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Unique identifier for one spawned server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to the live server process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    id: ProcessId,
    pid: u32,
}

impl ProcessHandle {
    pub fn new(id: ProcessId, pid: u32) -> Self {
        Self { id, pid }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Something the server process produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    /// A raw line from standard output
    Line(String),
    /// The process wrote to standard error and has been force-killed
    Fatal(String),
    /// The process exited, with its exit code when one is available
    Exited(Option<i32>),
}

/// Output of one process, in the order it was read
pub type OutputStream = mpsc::UnboundedReceiver<ProcessOutput>;

/// Command line for the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    /// `java -Xms.. -Xmx.. [extra] -jar <jar> [nogui]`, run from the install directory.
    pub fn from_server_config(config: &ServerConfig) -> Self {
        let mut args = vec![
            format!("-Xms{}", config.min_memory),
            format!("-Xmx{}", config.max_memory),
        ];
        args.extend(config.extra_args.iter().cloned());
        args.push("-jar".to_string());
        args.push(config.jar.clone());
        if !config.gui {
            args.push("nogui".to_string());
        }

        Self {
            program: config.java.clone(),
            args,
            working_dir: config.install_dir.clone(),
            env: config.env.clone(),
        }
    }
}

/// Spawns and kills the one server process.
///
/// Implemented by [`ProcessSupervisor`] for real OS processes; the controller
/// only talks to this trait.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Spawn the process. Fails with [`Error::AlreadyRunning`] while a handle is live.
    async fn spawn(&self, launch: &LaunchSpec) -> Result<(ProcessHandle, OutputStream)>;

    /// Interrupt the process and wait for it to exit.
    async fn kill(&self, handle: ProcessHandle) -> Result<()>;

    /// Whether a spawned process has not yet exited
    fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Interrupt,
    Kill,
}

struct LiveProcess {
    handle: ProcessHandle,
    signals: mpsc::UnboundedSender<Signal>,
    exited: watch::Receiver<bool>,
}

/// Supervises a single OS process through `async-process`.
///
/// Standard output is forwarded line by line. The first line on standard
/// error force-kills the process and is reported as [`ProcessOutput::Fatal`].
pub struct ProcessSupervisor {
    kill_grace: Duration,
    poll_interval: Duration,
    live: Arc<Mutex<Option<LiveProcess>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor that waits `kill_grace` after an interrupt before killing outright
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            kill_grace,
            poll_interval: Duration::from_millis(100),
            live: Arc::new(Mutex::new(None)),
        }
    }

    fn lock_live(&self) -> Result<std::sync::MutexGuard<'_, Option<LiveProcess>>> {
        self.live
            .lock()
            .map_err(|_| Error::Other("Failed to lock live process".to_string()))
    }
}

async fn forward_stdout<R>(stdout: R, output: mpsc::UnboundedSender<ProcessOutput>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                tracing::trace!(target: "mc_steward::server_output", "{}", line);
                if output.send(ProcessOutput::Line(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read server stdout");
                break;
            }
        }
    }
}

async fn watch_stderr<R>(
    stderr: R,
    output: mpsc::UnboundedSender<ProcessOutput>,
    signals: mpsc::UnboundedSender<Signal>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut reported = false;
    while let Some(Ok(line)) = lines.next().await {
        if line.trim().is_empty() {
            continue;
        }
        tracing::error!(line = %line, "Server wrote to stderr");
        if !reported {
            reported = true;
            let _ = signals.send(Signal::Kill);
            let _ = output.send(ProcessOutput::Fatal(line));
        }
    }
}

fn deliver(child: &mut Child, signal: Signal) {
    match signal {
        #[cfg(unix)]
        Signal::Interrupt => {
            let pid = child.id() as libc::pid_t;
            // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped.
            let rc = unsafe { libc::kill(pid, libc::SIGINT) };
            if rc != 0 {
                tracing::warn!(pid, "Failed to send SIGINT to server process");
            }
        }
        #[cfg(not(unix))]
        Signal::Interrupt => {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "Failed to kill server process");
            }
        }
        Signal::Kill => {
            if let Err(e) = child.kill() {
                tracing::warn!(error = %e, "Failed to kill server process");
            }
        }
    }
}

// How long an exited process's remaining stdout may take to drain.
const STDOUT_DRAIN_LIMIT: Duration = Duration::from_secs(2);

#[allow(clippy::too_many_arguments)]
async fn watch_child(
    mut child: Child,
    stdout: JoinHandle<()>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    exited: watch::Sender<bool>,
    output: mpsc::UnboundedSender<ProcessOutput>,
    live: Arc<Mutex<Option<LiveProcess>>>,
    id: ProcessId,
    poll_interval: Duration,
) {
    let code = loop {
        match child.try_status() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll server process");
                break None;
            }
        }

        tokio::select! {
            Some(signal) = signals.recv() => deliver(&mut child, signal),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    };

    tracing::info!(process_id = %id, exit_code = ?code, "Server process exited");

    // Every stdout line goes out before Exited.
    if tokio::time::timeout(STDOUT_DRAIN_LIMIT, stdout).await.is_err() {
        tracing::warn!(process_id = %id, "Server stdout still open after exit");
    }

    if let Ok(mut slot) = live.lock() {
        if slot.as_ref().is_some_and(|p| p.handle.id() == id) {
            *slot = None;
        }
    }
    let _ = exited.send(true);
    let _ = output.send(ProcessOutput::Exited(code));
}

async fn wait_exited(exited: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    // A closed channel also means the watcher is done with the process.
    matches!(
        tokio::time::timeout(limit, exited.wait_for(|done| *done)).await,
        Ok(_)
    )
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    #[tracing::instrument(skip(self, launch), fields(program = %launch.program))]
    async fn spawn(&self, launch: &LaunchSpec) -> Result<(ProcessHandle, OutputStream)> {
        let mut live = self.lock_live()?;
        if live.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let mut command = Command::new(&launch.program);
        command.args(&launch.args).current_dir(&launch.working_dir);

        for (key, value) in &launch.env {
            command.env(key, value);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Process(format!("Failed to start process: {}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Process("Failed to get stdout pipe from child process".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Process("Failed to get stderr pipe from child process".to_string())
        })?;

        let handle = ProcessHandle::new(ProcessId::new(), child.id());
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(false);

        *live = Some(LiveProcess {
            handle,
            signals: signal_tx.clone(),
            exited: exit_rx,
        });
        drop(live);

        let stdout_task = tokio::spawn(forward_stdout(stdout, output_tx.clone()));
        tokio::spawn(watch_stderr(stderr, output_tx.clone(), signal_tx));
        tokio::spawn(watch_child(
            child,
            stdout_task,
            signal_rx,
            exit_tx,
            output_tx,
            Arc::clone(&self.live),
            handle.id(),
            self.poll_interval,
        ));

        tracing::info!(process_id = %handle.id(), pid = handle.pid(), "Server process spawned");
        Ok((handle, output_rx))
    }

    #[tracing::instrument(skip(self), fields(process_id = %handle.id()))]
    async fn kill(&self, handle: ProcessHandle) -> Result<()> {
        let (signals, mut exited) = {
            let live = self.lock_live()?;
            match live.as_ref() {
                Some(p) if p.handle.id() == handle.id() => (p.signals.clone(), p.exited.clone()),
                _ => return Err(Error::NotRunning),
            }
        };

        if signals.send(Signal::Interrupt).is_err() {
            // Watcher already finished: the process is gone.
            return Ok(());
        }

        if wait_exited(&mut exited, self.kill_grace).await {
            return Ok(());
        }

        tracing::warn!(
            grace_secs = self.kill_grace.as_secs(),
            "Server ignored interrupt, killing it"
        );
        let _ = signals.send(Signal::Kill);
        if wait_exited(&mut exited, self.kill_grace).await {
            Ok(())
        } else {
            Err(Error::Timeout(format!(
                "process {} did not exit",
                handle.pid()
            )))
        }
    }

    fn is_running(&self) -> bool {
        self.live.lock().map(|live| live.is_some()).unwrap_or(false)
    }
}
