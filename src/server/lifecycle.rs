use crate::error::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::broadcast;

/// Observable state of the supervised server.
///
/// Never persisted: it is recomputed from the in-flight transition and a
/// remote console probe every time it is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// No process, remote console unreachable
    Offline,
    /// A start or stop has been requested but not yet confirmed
    Starting,
    /// Remote console reachable
    Online,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Offline => "offline",
            ServerState::Starting => "starting",
            ServerState::Online => "online",
        };
        f.write_str(s)
    }
}

/// What a single line of server output means for the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// `Done (3.2s)! For help, type "help"`
    StartupComplete,
    /// `Stopping server`
    Stopped,
    PlayerJoined(String),
    PlayerLeft(String),
}

/// How a classifier rule matches the stripped message.
#[derive(Debug, Clone, Copy)]
pub enum LineMatch {
    /// Message starts with the first string and contains the second after it.
    PrefixThen(&'static str, &'static str),
    /// Message equals the string.
    Exact(&'static str),
    /// Message ends with the string; the text before it is captured.
    CaptureBefore(&'static str),
}

/// Kind of [`LogEvent`] a rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    StartupComplete,
    Stopped,
    PlayerJoined,
    PlayerLeft,
}

/// Log text to lifecycle mapping. The first matching rule wins; lines no rule
/// matches are ignored.
pub const CLASSIFIERS: &[(LineMatch, LogEventKind)] = &[
    (LineMatch::PrefixThen("Done (", ")!"), LogEventKind::StartupComplete),
    (LineMatch::Exact("Stopping server"), LogEventKind::Stopped),
    (LineMatch::CaptureBefore(" joined the game"), LogEventKind::PlayerJoined),
    (LineMatch::CaptureBefore(" left the game"), LogEventKind::PlayerLeft),
];

/// Strips the server's `[12:00:00] [Server thread/INFO]: ` prefix.
///
/// Any run of bracketed groups closed by `]: ` is removed. Lines without that
/// shape are returned trimmed but otherwise untouched.
pub fn strip_log_prefix(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with('[') {
        return line.trim();
    }
    match line.find("]: ") {
        Some(idx) => line[idx + 3..].trim(),
        None => line.trim(),
    }
}

fn apply_rule(message: &str, rule: LineMatch) -> Option<Option<String>> {
    match rule {
        LineMatch::PrefixThen(prefix, then) => message
            .strip_prefix(prefix)
            .filter(|rest| rest.contains(then))
            .map(|_| None),
        LineMatch::Exact(text) => (message == text).then_some(None),
        LineMatch::CaptureBefore(suffix) => message
            .strip_suffix(suffix)
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.contains(' '))
            .map(|name| Some(name.to_string())),
    }
}

/// Classifies one raw line of server output.
pub fn classify_line(line: &str) -> Option<LogEvent> {
    let message = strip_log_prefix(line);
    CLASSIFIERS.iter().find_map(|(rule, kind)| {
        let captured = apply_rule(message, *rule)?;
        match (*kind, captured) {
            (LogEventKind::StartupComplete, _) => Some(LogEvent::StartupComplete),
            (LogEventKind::Stopped, _) => Some(LogEvent::Stopped),
            (LogEventKind::PlayerJoined, Some(name)) => Some(LogEvent::PlayerJoined(name)),
            (LogEventKind::PlayerLeft, Some(name)) => Some(LogEvent::PlayerLeft(name)),
            _ => None,
        }
    })
}

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Start requested, process spawned
    Starting,
    /// Startup confirmed
    Online,
    /// Stop requested
    Stopping,
    /// Server went down
    Offline,
    /// Process wrote to its error stream and was killed
    Fatal,
    /// Transition not confirmed in time; state re-probed
    TimedOut,
    PlayerJoined,
    PlayerLeft,
}

/// Server lifecycle event, as pushed to notifiers
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Human-readable description
    pub description: String,
    /// Where players can connect, when known
    pub address: Option<String>,
    /// Event timestamp
    pub timestamp: Instant,
}

type EventCallback = Box<dyn Fn(&ServerEvent) + Send + Sync>;

/// Records lifecycle events and pushes them to subscribers.
///
/// Callbacks registered with [`on_event`](Self::on_event) run synchronously on
/// the recording task; [`subscribe`](Self::subscribe) hands out broadcast
/// receivers for async consumers.
pub struct ServerLifecycleManager {
    /// Server events
    events: Arc<Mutex<Vec<ServerEvent>>>,
    callbacks: Arc<Mutex<Vec<EventCallback>>>,
    sender: broadcast::Sender<ServerEvent>,
}

const MAX_EVENT_HISTORY: usize = 1000;

impl ServerLifecycleManager {
    /// Create a new server lifecycle manager
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            sender,
        }
    }

    /// Register a push callback invoked for every recorded event
    pub fn on_event<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| Error::Other("Failed to lock event callbacks".to_string()))?;
        callbacks.push(Box::new(callback));
        Ok(())
    }

    /// Get a new receiver for recorded events
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Record a server event
    pub fn record_event(
        &self,
        event: ServerLifecycleEvent,
        description: impl Into<String>,
        address: Option<String>,
    ) -> Result<()> {
        let server_event = ServerEvent {
            event,
            description: description.into(),
            address,
            timestamp: Instant::now(),
        };
        tracing::debug!(event = ?server_event.event, description = %server_event.description, "Recording lifecycle event");

        {
            let mut events = self
                .events
                .lock()
                .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

            events.push(server_event.clone());

            // Limit event history
            if events.len() > MAX_EVENT_HISTORY {
                events.remove(0);
            }
        }

        {
            let callbacks = self
                .callbacks
                .lock()
                .map_err(|_| Error::Other("Failed to lock event callbacks".to_string()))?;
            for callback in callbacks.iter() {
                callback(&server_event);
            }
        }

        // No receivers is fine
        let _ = self.sender.send(server_event);

        Ok(())
    }

    /// Get recent events, newest first
    pub fn get_events(&self, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        // Recorded in order, so newest first is a reverse walk
        let limit = limit.unwrap_or(events.len());
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    /// Clear events
    pub fn clear_events(&self) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        events.clear();

        Ok(())
    }
}

impl Default for ServerLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
