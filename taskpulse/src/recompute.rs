//! Batch recomputation of the derived flags over every stored task.
//!
//! Time moves on while tasks sit in storage, so flags written at save time go
//! stale: a task that was calm yesterday may be urgent today. The
//! [`BatchRecomputer`] walks the whole table in id order, one bounded page at
//! a time, re-derives each record's flags and writes back only the records
//! whose flags changed.
//!
//! Write-back uses [`TaskRepository::save_quiet`], so a sweep neither
//! re-enters the save hook nor emits change events. Only the two flag
//! columns are written, and a record whose deadline or status was edited
//! after its page was read is skipped: the user's save already derived
//! fresh flags for it.

use std::sync::Arc;

use taskpulse_proto::task::TaskId;

use crate::clock::Clock;
use crate::flags;
use crate::repo::TaskRepository;
use crate::store::{StoreError, TaskStore};

/// Default number of records read per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Outcome of one full recompute pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    /// Non-empty pages read.
    pub pages: usize,
    /// Records visited.
    pub processed: usize,
    /// Records whose flags changed and were written back.
    pub updated: usize,
    /// Records left alone because they were edited or deleted while the
    /// pass was running.
    pub skipped: usize,
    /// Records whose write-back failed.
    pub failed: usize,
}

/// Errors raised by a recompute pass.
#[derive(Debug, thiserror::Error)]
pub enum RecomputeError {
    /// A page size of zero can never make progress.
    #[error("page size must be at least 1")]
    ZeroPageSize,

    /// A page could not be read; the pass cannot continue past it.
    #[error("failed to read task page after {}: {source}", cursor_label(.after))]
    Scan {
        /// Cursor of the page that failed.
        after: Option<TaskId>,
        /// Underlying storage error.
        source: StoreError,
    },

    /// A single record could not be written back. Logged and counted in
    /// [`RecomputeReport::failed`]; the pass continues.
    #[error("failed to store flags for task {task_id}: {source}")]
    Record {
        /// The record that failed.
        task_id: TaskId,
        /// Underlying storage error.
        source: StoreError,
    },
}

#[allow(clippy::ref_option)]
fn cursor_label(after: &Option<TaskId>) -> String {
    after.map_or_else(|| "start".to_string(), |id| id.to_string())
}

/// Re-derives flags for every stored task in bounded pages.
pub struct BatchRecomputer<S, C> {
    repo: Arc<TaskRepository<S, C>>,
}

impl<S, C> Clone for BatchRecomputer<S, C> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<S: TaskStore, C: Clock> BatchRecomputer<S, C> {
    /// Creates a recomputer over a shared repository.
    #[must_use]
    pub const fn new(repo: Arc<TaskRepository<S, C>>) -> Self {
        Self { repo }
    }

    /// Runs one full pass over all tasks, reading `page_size` records at a
    /// time.
    ///
    /// Each record is evaluated against the clock reading taken when that
    /// record is visited. At most `page_size` records are held in memory.
    ///
    /// # Errors
    ///
    /// Returns [`RecomputeError::ZeroPageSize`] for a zero page size and
    /// [`RecomputeError::Scan`] if a page cannot be read. Per-record write
    /// failures do not abort the pass.
    pub async fn recompute_all(&self, page_size: usize) -> Result<RecomputeReport, RecomputeError> {
        if page_size == 0 {
            return Err(RecomputeError::ZeroPageSize);
        }

        let mut report = RecomputeReport::default();
        let mut cursor: Option<TaskId> = None;

        loop {
            let page = self
                .repo
                .scan_page(cursor, page_size)
                .await
                .map_err(|source| RecomputeError::Scan {
                    after: cursor,
                    source,
                })?;
            if page.is_empty() {
                break;
            }

            report.pages += 1;
            let last_page = page.len() < page_size;
            cursor = page.last().map(|task| task.id);

            for mut task in page {
                report.processed += 1;
                let now = self.repo.clock().now();
                if !flags::refresh(&mut task, now) {
                    continue;
                }
                match self.repo.save_quiet(&task).await {
                    Ok(true) => report.updated += 1,
                    Ok(false) => {
                        report.skipped += 1;
                        tracing::debug!(task_id = %task.id, "task changed during recompute, skipped");
                    }
                    Err(source) => {
                        report.failed += 1;
                        let err = RecomputeError::Record {
                            task_id: task.id,
                            source,
                        };
                        tracing::warn!(error = %err, "skipping task during recompute");
                    }
                }
            }

            if last_page {
                break;
            }
        }

        tracing::info!(
            pages = report.pages,
            processed = report.processed,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "task flags recomputed"
        );
        Ok(report)
    }
}
