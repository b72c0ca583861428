//! Derivation of the `is_urgent` / `is_overdue` flags.
//!
//! [`compute`] is a pure function of deadline, status and "now". It is
//! evaluated by the repository's save hook before every normal write and by
//! the batch recomputer during sweeps.
//!
//! Rules, first match wins:
//!
//! 1. no deadline, or status is `DONE` → calm
//! 2. deadline before now → overdue
//! 3. less than [`URGENCY_WINDOW`] until the deadline → urgent
//! 4. otherwise → calm

use chrono::{DateTime, Duration, Utc};
use taskpulse_proto::task::{Status, StatusFlags, Task};

/// How close a deadline must be for a task to count as urgent.
pub const URGENCY_WINDOW: Duration = Duration::hours(24);

/// Computes the derived flags for a deadline/status pair at instant `now`.
#[must_use]
pub fn compute(deadline: Option<DateTime<Utc>>, status: Status, now: DateTime<Utc>) -> StatusFlags {
    let Some(deadline) = deadline else {
        return StatusFlags::CALM;
    };
    if status == Status::Done {
        return StatusFlags::CALM;
    }

    if deadline < now {
        StatusFlags::OVERDUE
    } else if deadline - now < URGENCY_WINDOW {
        StatusFlags::URGENT
    } else {
        StatusFlags::CALM
    }
}

/// Recomputes and stores the flags on `task`.
///
/// Returns `true` if the stored flags changed.
pub fn refresh(task: &mut Task, now: DateTime<Utc>) -> bool {
    let flags = compute(task.deadline, task.status, now);
    if task.flags() == flags {
        return false;
    }
    task.set_flags(flags);
    true
}
