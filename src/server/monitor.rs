use crate::config::TimeoutConfig;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Watchdog configuration
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How long a start may go without a startup-complete line
    pub start_timeout: Duration,
    /// How long a stop may go without the process going away
    pub stop_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        TimeoutConfig::default().into()
    }
}

impl From<TimeoutConfig> for WatchdogConfig {
    fn from(timeouts: TimeoutConfig) -> Self {
        Self {
            start_timeout: timeouts.start(),
            stop_timeout: timeouts.stop(),
        }
    }
}

/// Bounds an in-flight transition.
///
/// Holds at most one timer. Arming replaces any previous timer, disarming or
/// dropping the watchdog cancels it. The expiry callback is responsible for
/// checking that the transition it was armed for is still the current one.
#[derive(Default)]
pub struct TransitionWatchdog {
    /// Timer task
    task: Option<JoinHandle<()>>,
}

impl TransitionWatchdog {
    pub fn new() -> Self {
        Self { task: None }
    }

    /// Run `on_expire` after `timeout` unless disarmed first
    pub fn arm<F, Fut>(&mut self, timeout: Duration, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disarm();
        tracing::debug!(timeout_secs = timeout.as_secs_f64(), "Arming transition watchdog");
        self.task = Some(tokio::spawn(async move {
            time::sleep(timeout).await;
            on_expire().await;
        }));
    }

    /// Cancel the pending timer, if any
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Forget the timer without cancelling it.
    ///
    /// Called from inside the expiry callback, where aborting would cancel the
    /// callback itself at its next await.
    pub fn release(&mut self) {
        self.task = None;
    }

    /// Whether a timer is pending
    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TransitionWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
