//! Core infrastructure for the Cadence scheduler.
//!
//! Holds the process-lifetime app state, the delay queue that releases jobs at their
//! target time, the worker pool consuming it, and the hour-window rate tracker.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod prelude;
pub mod rate_limit;
pub mod scheduler;
pub mod worker;

pub use app::{Adapters, App, AppOpts, AppState};

// vim: ts=4
