//! Invocation deadline tracking.
//!
//! # Design
//! - `DeadlineBudget` is an immutable anchor computed once per invocation; all
//!   subtraction saturates so a tiny remaining time yields an already-expired budget.
//! - `DeadlineMonitor` owns at most one background check. The early-report
//!   callback runs inside that task and is awaited to completion once started.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Safety margin subtracted from the host's remaining time.
pub const DEFAULT_BUFFER: Duration = Duration::from_secs(20);
/// Interval between background deadline checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed point in time after which no new work may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineBudget {
    deadline: Instant,
    buffer: Duration,
}

impl DeadlineBudget {
    /// Anchor a budget at `now + remaining - buffer`.
    #[must_use]
    pub fn from_remaining(remaining: Duration, buffer: Duration) -> Self {
        Self {
            deadline: Instant::now() + remaining.saturating_sub(buffer),
            buffer,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has been reached.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The anchored deadline.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The buffer that was subtracted.
    #[must_use]
    pub const fn buffer(&self) -> Duration {
        self.buffer
    }
}

struct ArmedCheck {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<bool>,
}

/// Runs a callback once if the deadline passes while work is still in flight.
///
/// Dropping an armed monitor cancels the pending check without waiting for it.
pub struct DeadlineMonitor {
    budget: DeadlineBudget,
    check_interval: Duration,
    armed: Option<ArmedCheck>,
}

impl DeadlineMonitor {
    /// Create an unarmed monitor.
    #[must_use]
    pub fn new(budget: DeadlineBudget, check_interval: Duration) -> Self {
        Self {
            budget,
            check_interval: check_interval.max(Duration::from_millis(1)),
            armed: None,
        }
    }

    /// The budget this monitor watches.
    #[must_use]
    pub const fn budget(&self) -> DeadlineBudget {
        self.budget
    }

    /// Whether the deadline has been reached.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.budget.expired()
    }

    /// Whether a background check is currently scheduled.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Schedule `callback` to run once, the first time a periodic check finds the
    /// deadline expired. Arming an already-armed monitor is a no-op.
    pub fn arm_early_report<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.armed.is_some() {
            warn!("deadline monitor already armed");
            return;
        }

        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let budget = self.budget;
        let period = self.check_interval;
        let handle = tokio::spawn(async move {
            let mut callback = Some(callback);
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => return false,
                    _ = ticker.tick() => {
                        if !budget.expired() {
                            continue;
                        }
                        debug!("deadline reached with work in flight");
                        if let Some(callback) = callback.take() {
                            callback().await;
                        }
                        return true;
                    }
                }
            }
        });
        self.armed = Some(ArmedCheck { cancel, handle });
    }

    /// Cancel the pending check and wait for it to settle.
    ///
    /// If the callback already started, this waits for it to finish. Returns
    /// whether the callback ran.
    pub async fn disarm(&mut self) -> bool {
        let Some(ArmedCheck { cancel, handle }) = self.armed.take() else {
            return false;
        };
        // The receiver is gone once the task has returned.
        let _ = cancel.send(());
        match handle.await {
            Ok(fired) => fired,
            Err(err) => {
                warn!(error = %err, "deadline monitor task failed");
                false
            }
        }
    }
}
