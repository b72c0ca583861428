//! `TaskPulse` core: deadline flag derivation, persistence, batch recompute,
//! recurring sweep and listing order.

pub mod clock;
pub mod filter;
pub mod flags;
pub mod ordering;
pub mod recompute;
pub mod repo;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::TaskFilter;
pub use recompute::{BatchRecomputer, RecomputeError, RecomputeReport};
pub use repo::{TaskEvent, TaskRepository};
pub use service::{NewTask, TaskError, TaskPatch, TaskService};
pub use sqlite::SqliteTaskStore;
pub use store::{InMemoryTaskStore, StoreError, TaskStore};
pub use sweeper::{RecurringSweeper, SweepEvent};
