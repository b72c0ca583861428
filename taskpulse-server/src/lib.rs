//! `TaskPulse` server library.
//!
//! Exposes the HTTP API, configuration and presentation helpers for use in
//! the `taskpulse-server` binary and in tests.

pub mod api;
pub mod config;
pub mod present;
