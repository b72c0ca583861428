//! Recurring flag sweep.
//!
//! [`RecurringSweeper`] runs [`BatchRecomputer::recompute_all`] immediately on
//! start and then once per interval (hourly by default) until its
//! [`CancellationToken`] is cancelled. Every finished pass is logged and
//! broadcast as a [`SweepEvent`].
//!
//! Run exactly one sweeper per deployment. Two sweepers racing over the same
//! rows only waste work: the recompute is idempotent.
//!
//! # Usage
//!
//! ```rust,ignore
//! let sweeper = RecurringSweeper::new(
//!     BatchRecomputer::new(Arc::clone(&repo)),
//!     SystemClock,
//!     cancel.child_token(),
//! );
//! let handle = sweeper.spawn();
//! // ...
//! cancel.cancel();
//! handle.await?;
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::Clock;
use crate::recompute::{BatchRecomputer, DEFAULT_PAGE_SIZE, RecomputeReport};
use crate::store::TaskStore;

/// Default pause between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Capacity of the sweep-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Emitted after every sweep pass, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepEvent {
    /// 1-based pass counter since the sweeper started.
    pub pass: u64,
    /// Clock reading when the pass finished.
    pub completed_at: DateTime<Utc>,
    /// The pass report, or the error message if the pass aborted.
    pub outcome: Result<RecomputeReport, String>,
}

/// Drives a [`BatchRecomputer`] on a fixed interval.
pub struct RecurringSweeper<S, C> {
    recomputer: BatchRecomputer<S, C>,
    clock: C,
    interval: Duration,
    page_size: usize,
    events: broadcast::Sender<SweepEvent>,
    cancel: CancellationToken,
}

impl<S, C> RecurringSweeper<S, C>
where
    S: TaskStore + 'static,
    C: Clock + Clone,
{
    /// Creates a sweeper that runs until `cancel` is cancelled.
    ///
    /// `clock` only stamps [`SweepEvent::completed_at`]; flag derivation uses
    /// the repository's clock.
    #[must_use]
    pub fn new(recomputer: BatchRecomputer<S, C>, clock: C, cancel: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            recomputer,
            clock,
            interval: DEFAULT_SWEEP_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            events,
            cancel,
        }
    }

    /// Overrides the pause between passes.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the recompute page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Subscribes to pass-completion events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.events.subscribe()
    }

    /// Spawns [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs passes until cancelled.
    ///
    /// Cancellation is observed both while sleeping and while a pass is in
    /// progress; an interrupted pass leaves every row either untouched or
    /// fully updated.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            page_size = self.page_size,
            "task flag sweeper started"
        );

        let mut pass: u64 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                outcome = self.recomputer.recompute_all(self.page_size) => outcome,
            };

            pass += 1;
            let completed_at = self.clock.now();
            let outcome = match outcome {
                Ok(report) => {
                    info!(
                        pass,
                        completed_at = %completed_at,
                        updated = report.updated,
                        failed = report.failed,
                        "task flags updated"
                    );
                    Ok(report)
                }
                Err(e) => {
                    error!(pass, error = %e, "task flag sweep failed, retrying next interval");
                    Err(e.to_string())
                }
            };
            // No subscribers is not an error.
            let _ = self.events.send(SweepEvent {
                pass,
                completed_at,
                outcome,
            });

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(passes = pass, "task flag sweeper stopped");
    }
}
