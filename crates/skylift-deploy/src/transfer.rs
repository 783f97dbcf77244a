//! Concurrent execution of one batch and progress reporting across batches.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::batch::Batch;
use crate::error::DeployResult;

/// Minimum interval between periodic progress lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome counts for a batch or an entire action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTally {
    /// Transfers launched.
    pub attempted: usize,
    /// Transfers that finished without error.
    pub succeeded: usize,
    /// Transfers that failed.
    pub failed: usize,
}

impl TransferTally {
    /// Accumulate another tally into this one.
    pub const fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Launch every transfer in `batch` concurrently and wait for all of them.
///
/// Failures are logged and counted; they never cancel sibling transfers.
pub async fn run_batch<'a, T, F, Fut>(batch: &'a Batch<T>, transfer_one: F) -> TransferTally
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = DeployResult<()>> + 'a,
{
    let results = join_all(batch.items.iter().map(transfer_one)).await;
    let mut tally = TransferTally::default();
    for result in results {
        tally.attempted += 1;
        match result {
            Ok(()) => tally.succeeded += 1,
            Err(err) => {
                tally.failed += 1;
                warn!(error = %err.report_reason(), "transfer failed");
            }
        }
    }
    tally
}

/// Throttled progress logging for a multi-batch action.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    processed: usize,
    started: Instant,
    last_logged: Instant,
    interval: Duration,
}

impl ProgressTracker {
    /// Track progress over `total` items.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self::with_interval(total, PROGRESS_INTERVAL)
    }

    /// Track progress with a custom logging interval.
    #[must_use]
    pub fn with_interval(total: usize, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            total,
            processed: 0,
            started: now,
            last_logged: now,
            interval,
        }
    }

    /// Record `count` processed items; returns whether a progress line was logged.
    pub fn update(&mut self, count: usize) -> bool {
        self.processed = self.processed.saturating_add(count);
        if self.last_logged.elapsed() < self.interval {
            return false;
        }
        self.log_progress();
        self.last_logged = Instant::now();
        true
    }

    /// Log the current progress unconditionally.
    pub fn log_progress(&self) {
        info!(
            processed = self.processed,
            total = self.total,
            percent = self.percent(),
            elapsed_secs = self.started.elapsed().as_secs(),
            "transfer progress"
        );
    }

    /// Items processed so far.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.processed
    }

    /// Whole-number completion percentage; an empty workload is complete.
    #[must_use]
    pub const fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.processed.saturating_mul(100) / self.total
        }
    }
}
