//! Cadence schedules large batches of outbound email at per-recipient times while keeping
//! every user under an hourly send quota.
//!
//! # Features
//!
//! - Campaigns materialized transactionally, one scheduled email per recipient
//! - In-process delay queue with stable per-email job ids
//!     - retries with exponential backoff
//!     - aggregate jobs-per-hour ceiling
//! - Per-user hourly quotas counted in a fast cache and a durable store
//!     - quota denials are rescheduled, never failed
//! - At most one dispatch per email, guarded by a processing lock
//! - Restart recovery from the job store

// Re-export shared types and adapter traits from cadence-types
pub use cadence_types::cache_adapter;
pub use cadence_types::error;
pub use cadence_types::job_adapter;
pub use cadence_types::mail_transport;
pub use cadence_types::types;

pub use cadence_types::lock;

pub use cadence_campaign as campaign;
pub use cadence_core::{rate_limit, scheduler, worker};
pub use cadence_email as email;

pub mod app;
pub mod prelude;

pub use app::{AppBuilder, Runtime};
pub use cadence_core::app::{App, AppOpts, AppState, VERSION};

// vim: ts=4
