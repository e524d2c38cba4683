//! Bounded readiness polling
//!
//! The gateway deploys and undeploys apps out of band. Instead of sleeping
//! for a fixed time, poll an observable signal until it holds or a deadline
//! passes. A timeout is reported, not retried: callers decide whether to
//! fail or to let later assertions report the problem.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::wait::{eventually, path_exists};
//! use std::time::Duration;
//!
//! let anchor = apps_dir.join("orders-proxy-anchor.txt");
//! eventually(&format!("anchor {}", anchor.display()), || path_exists(&anchor))
//!     .timeout(Duration::from_secs(15))
//!     .interval(Duration::from_millis(500))
//!     .await_condition()
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Rich error context for a wait that timed out
#[derive(Debug, Clone)]
pub struct WaitError {
    /// What we were waiting for
    pub target: String,
    /// Description of the last observed state
    pub last_state: String,
    /// Number of checks made
    pub attempts: u32,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The configured timeout
    pub timeout: Duration,
}

impl WaitError {
    pub fn new(target: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            last_state: "condition not met".to_string(),
            attempts: 0,
            elapsed,
            timeout,
        }
    }

    /// Set the last observed state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wait timeout for {}", self.target)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Attempts: {}", self.attempts)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        write!(f, "└─ Timeout: {:?}", self.timeout)
    }
}

impl std::error::Error for WaitError {}

/// A successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waited {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Builder for a bounded poll
pub struct Eventually<'a, F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    target: &'a str,
    condition: F,
    timeout: Duration,
    interval: Duration,
}

/// Poll `condition` until it returns true
///
/// Default timeout: 30 seconds
/// Default interval: 250ms
pub fn eventually<F, Fut>(target: &str, condition: F) -> Eventually<'_, F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    Eventually {
        target,
        condition,
        timeout: Duration::from_secs(30),
        interval: Duration::from_millis(250),
    }
}

impl<F, Fut> Eventually<'_, F, Fut>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    /// Set the overall deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between checks
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check until success or timeout
    ///
    /// The condition is always checked at least once, and once more at the
    /// deadline, so a zero timeout still observes the current state.
    pub async fn await_condition(mut self) -> Result<Waited, WaitError> {
        let start = Instant::now();
        let deadline = deadline_after(start, self.timeout);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if (self.condition)().await {
                let elapsed = start.elapsed();
                debug!(condition = %self.target, attempts, elapsed = ?elapsed, "Condition met");
                return Ok(Waited { attempts, elapsed });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::new(self.target, self.timeout, start.elapsed())
                    .with_attempts(attempts));
            }

            debug!(condition = %self.target, attempts, "Condition not met, waiting...");
            sleep(self.interval.min(deadline - now)).await;
        }
    }
}

/// Stands in for a deadline that `Instant` cannot represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + timeout`, saturating instead of overflowing
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// True when `path` exists
pub async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// True when `path` is gone
pub async fn path_absent(path: &Path) -> bool {
    !path_exists(path).await
}
