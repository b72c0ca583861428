//! Listing order.
//!
//! Clients ask for an order with a key such as `deadline`, `-priority` or
//! `-is_urgent`. Keys parse into a closed [`OrderingKey`]; every variant maps
//! to one comparator. Unknown keys leave the listing untouched.
//!
//! The two urgency keys are composite: `urgent` and `overdue` are exclusive
//! categories rather than points on one scale, so each task is placed in a
//! bucket and the buckets are sorted.
//!
//! | bucket | `is_urgent` | `-is_urgent` |
//! |--------|-------------|--------------|
//! | done | 1 | 4 |
//! | neither flag | 2 | 3 |
//! | urgent | 3 | 2 |
//! | overdue | 4 | 1 |
//!
//! Flags are non-nullable, so the catch-all "other" bucket of the calm-first
//! order can never be reached; a corrupt record with both flags set falls
//! into the first matching row (urgent when calm first, overdue when
//! pressing first).

use std::cmp::Ordering;

use taskpulse_proto::task::{Status, Task};

/// A single column with a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    /// Priority rank, `LOW` < `MEDIUM` < `HIGH` < `CRITICAL`.
    Priority,
    /// Stored status code.
    Status,
    /// Deadline, absent deadlines first.
    Deadline,
    /// Overdue flag, `false` first.
    IsOverdue,
}

impl SortColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "priority" => Some(Self::Priority),
            "status" => Some(Self::Status),
            "deadline" => Some(Self::Deadline),
            "is_overdue" => Some(Self::IsOverdue),
            _ => None,
        }
    }

    fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            Self::Priority => a.priority.rank().cmp(&b.priority.rank()),
            Self::Status => a.status.as_str().cmp(b.status.as_str()),
            Self::Deadline => a.deadline.cmp(&b.deadline),
            Self::IsOverdue => a.is_overdue.cmp(&b.is_overdue),
        }
    }
}

/// A supported ordering request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingKey {
    /// Plain column order.
    Column {
        /// Column to compare.
        column: SortColumn,
        /// Reverse the column order.
        descending: bool,
    },
    /// `is_urgent`: calmest first, done tasks at the top.
    CalmFirst,
    /// `-is_urgent`: most pressing first, done tasks at the bottom.
    PressingFirst,
}

impl OrderingKey {
    /// Parses a client ordering key. Returns `None` for unsupported keys.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "is_urgent" => return Some(Self::CalmFirst),
            "-is_urgent" => return Some(Self::PressingFirst),
            _ => {}
        }
        let (name, descending) = match key.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (key, false),
        };
        SortColumn::parse(name).map(|column| Self::Column { column, descending })
    }

    /// Compares two tasks under this ordering.
    #[must_use]
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            Self::Column { column, descending } => {
                let ord = column.compare(a, b);
                if descending { ord.reverse() } else { ord }
            }
            Self::CalmFirst => calm_first_bucket(a).cmp(&calm_first_bucket(b)),
            Self::PressingFirst => pressing_first_bucket(a).cmp(&pressing_first_bucket(b)),
        }
    }

    /// Sorts `tasks` in place. The sort is stable, so ties keep their
    /// incoming order.
    pub fn sort(self, tasks: &mut [Task]) {
        tasks.sort_by(|a, b| self.compare(a, b));
    }
}

/// Orders `tasks` by the client key `key`.
///
/// Unknown keys are not an error: the input order is kept.
pub fn order(tasks: &mut [Task], key: &str) {
    match OrderingKey::parse(key) {
        Some(ordering) => ordering.sort(tasks),
        None => tracing::debug!(key, "unsupported ordering key, keeping input order"),
    }
}

fn calm_first_bucket(task: &Task) -> u8 {
    if task.status == Status::Done {
        1
    } else if !task.is_urgent && !task.is_overdue {
        2
    } else if task.is_urgent {
        3
    } else {
        4
    }
}

fn pressing_first_bucket(task: &Task) -> u8 {
    if task.status == Status::Done {
        4
    } else if task.is_overdue {
        1
    } else if task.is_urgent {
        2
    } else {
        3
    }
}
