/// Server process module for mc-steward.
///
/// This module owns everything that touches the game server's OS process:
/// spawning and interrupting it, reading its output, and turning output lines
/// into lifecycle events. All public components are instrumented with `tracing`.
///
/// # Components
///
/// * `lifecycle` - Server state, log line classification and the event notifier
/// * `monitor` - Watchdog that bounds unconfirmed start/stop transitions
/// * `process` - The single-process supervisor
///
/// # Examples
///
/// Classifying server output:
///
/// ```
/// use mc_steward::server::{LogEvent, classify_line};
///
/// let line = "[18:02:11] [Server thread/INFO]: Done (5.032s)! For help, type \"help\"";
/// assert_eq!(classify_line(line), Some(LogEvent::StartupComplete));
/// assert_eq!(classify_line("[18:02:12] [Server thread/INFO]: Saving chunks"), None);
/// ```
///
/// Listening for lifecycle events:
///
/// ```
/// use mc_steward::server::{ServerLifecycleEvent, ServerLifecycleManager};
///
/// let manager = ServerLifecycleManager::new();
/// manager
///     .on_event(|event| println!("{:?}: {}", event.event, event.description))
///     .unwrap();
/// manager
///     .record_event(ServerLifecycleEvent::Online, "Server is up", None)
///     .unwrap();
/// ```
pub mod lifecycle;
pub mod monitor;
mod process;

pub use lifecycle::{
    LogEvent, ServerEvent, ServerLifecycleEvent, ServerLifecycleManager, ServerState,
    classify_line, strip_log_prefix,
};
pub use monitor::{TransitionWatchdog, WatchdogConfig};
pub use process::{
    LaunchSpec, OutputStream, ProcessHandle, ProcessId, ProcessOutput, ProcessSupervisor,
    Supervisor,
};
