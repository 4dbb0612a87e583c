//! Per-session inactivity watchdog for Parlor.
//!
//! A watchdog holds one deadline. Every accepted state-changing operation
//! on a session feeds it, pushing the deadline out by the configured
//! timeout. If the deadline passes, [`InactivityWatchdog::expired`]
//! resolves once and the watchdog disarms itself.
//!
//! # Disabled and disarmed
//!
//! When the timeout is `None` (disabled) or the watchdog is disarmed,
//! [`InactivityWatchdog::expired`] pends forever. A terminal session
//! disarms its watchdog so it can keep answering reads without ever
//! timing out again.
//!
//! # Integration
//!
//! The watchdog sits inside a session actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle command, feed on success */ }
//!         expiry = watchdog.expired() => { /* forfeit whoever is idle */ }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an inactivity watchdog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// How long a session may sit idle. `None` disables the watchdog.
    pub timeout: Option<Duration>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl WatchdogConfig {
    /// Shortest timeout accepted. Anything below is raised to this.
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Longest timeout accepted (one week).
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// A watchdog that fires after `timeout` of inactivity.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Builds a config from whole seconds, where 0 means disabled.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::disabled()
        } else {
            Self::with_timeout(Duration::from_secs(secs))
        }
    }

    /// A watchdog that never fires.
    pub fn disabled() -> Self {
        Self { timeout: None }
    }

    /// Clamps the timeout into `MIN_TIMEOUT..=MAX_TIMEOUT`.
    ///
    /// Called automatically by [`InactivityWatchdog::new`].
    pub fn validated(mut self) -> Self {
        if let Some(timeout) = self.timeout {
            let clamped = timeout.clamp(Self::MIN_TIMEOUT, Self::MAX_TIMEOUT);
            if clamped != timeout {
                warn!(
                    requested_secs = timeout.as_secs_f64(),
                    clamped_secs = clamped.as_secs_f64(),
                    "inactivity timeout out of range, clamping"
                );
                self.timeout = Some(clamped);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Expiry and metrics
// ---------------------------------------------------------------------------

/// Returned by [`InactivityWatchdog::expired`] when the deadline passes.
#[derive(Debug, Clone)]
pub struct Expiry {
    /// The deadline that elapsed.
    pub deadline: Instant,
    /// Time since the last feed (or since arming).
    pub idle_for: Duration,
}

/// Counters describing a watchdog's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogMetrics {
    /// Number of times the deadline was pushed out.
    pub feeds: u64,
    /// Number of times the deadline elapsed.
    pub expirations: u64,
    /// Longest gap observed between two feeds.
    pub longest_gap: Duration,
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// A re-armable inactivity deadline. One per live session.
pub struct InactivityWatchdog {
    config: WatchdogConfig,
    /// When the watchdog fires, if armed.
    deadline: Option<Instant>,
    last_activity: Instant,
    metrics: WatchdogMetrics,
}

impl InactivityWatchdog {
    /// Creates an armed watchdog whose first deadline is `now + timeout`.
    pub fn new(config: WatchdogConfig) -> Self {
        let config = config.validated();
        let now = Instant::now();
        let deadline = config.timeout.map(|t| now + t);

        match config.timeout {
            Some(t) => debug!(timeout_secs = t.as_secs_f64(), "inactivity watchdog armed"),
            None => debug!("inactivity watchdog disabled"),
        }

        Self {
            config,
            deadline,
            last_activity: now,
            metrics: WatchdogMetrics::default(),
        }
    }

    /// Records activity and pushes the deadline out by the timeout.
    ///
    /// Re-arms a watchdog that already fired. No-op when disabled.
    pub fn feed(&mut self) {
        let now = Instant::now();
        let gap = now.saturating_duration_since(self.last_activity);
        if gap > self.metrics.longest_gap {
            self.metrics.longest_gap = gap;
        }
        self.last_activity = now;
        self.metrics.feeds += 1;

        if let Some(timeout) = self.config.timeout {
            self.deadline = Some(now + timeout);
            trace!(feeds = self.metrics.feeds, "watchdog fed");
        }
    }

    /// Stops the watchdog. [`expired`](Self::expired) pends until the next
    /// [`feed`](Self::feed). Safe to call repeatedly.
    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!("inactivity watchdog disarmed");
        }
    }

    /// Waits until the deadline passes, then disarms and returns the expiry.
    ///
    /// Pends forever when disarmed or disabled; `tokio::select!` keeps
    /// polling its other branches. Cancel-safe: nothing changes until the
    /// sleep completes.
    pub async fn expired(&mut self) -> Expiry {
        let Some(deadline) = self.deadline else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        self.deadline = None;
        self.metrics.expirations += 1;
        let idle_for = self.idle_for();
        warn!(
            idle_secs = idle_for.as_secs_f64(),
            expirations = self.metrics.expirations,
            "inactivity deadline elapsed"
        );

        Expiry { deadline, idle_for }
    }

    /// Whether a deadline is currently pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether this watchdog was configured without a timeout.
    pub fn is_disabled(&self) -> bool {
        self.config.timeout.is_none()
    }

    /// The pending deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The configured timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    /// Time since the last feed.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity)
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> &WatchdogMetrics {
        &self.metrics
    }
}
