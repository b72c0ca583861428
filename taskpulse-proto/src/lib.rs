//! Shared task model and JSON wire types for `TaskPulse`.

pub mod api;
pub mod task;
