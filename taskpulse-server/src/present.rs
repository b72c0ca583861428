//! Conversion between stored UTC deadlines and display-timezone strings.
//!
//! Clients read and write deadlines as wall-clock strings in one fixed
//! display offset (`YYYY-MM-DD HH:MM:SS`). Input carrying an explicit offset
//! (RFC 3339) is taken as-is; bare date-times are interpreted in the display
//! offset; a bare date means midnight.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use taskpulse_proto::api::TaskResponse;
use taskpulse_proto::task::Task;

/// Output format for deadlines.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepted wall-clock input formats, tried in order.
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A deadline string that matched no accepted format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deadline is not a valid date: {0:?}")]
pub struct InvalidDeadline(pub String);

/// Parses a client deadline into UTC.
///
/// # Errors
///
/// Returns [`InvalidDeadline`] if `raw` is not a recognizable date or
/// date-time.
pub fn parse_deadline(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, InvalidDeadline> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| InvalidDeadline(raw.to_string()))?;

    // A fixed offset has no gaps or folds, so the mapping is always single.
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| InvalidDeadline(raw.to_string()))
}

/// Renders a UTC deadline in the display offset.
#[must_use]
pub fn format_deadline(deadline: DateTime<Utc>, offset: FixedOffset) -> String {
    deadline.with_timezone(&offset).format(DISPLAY_FORMAT).to_string()
}

/// Builds the client view of a task.
#[must_use]
pub fn task_response(task: Task, offset: FixedOffset) -> TaskResponse {
    TaskResponse {
        id: task.id,
        owner: task.owner,
        title: task.title,
        description: task.description,
        deadline: task.deadline.map(|d| format_deadline(d, offset)),
        priority: task.priority,
        status: task.status,
        tags: task.tags,
        is_urgent: task.is_urgent,
        is_overdue: task.is_overdue,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}
