//! Email dispatch for the Cadence scheduler
//!
//! This crate provides:
//! - SMTP delivery with lettre (`SmtpSender`)
//! - The dispatch task run by the worker pool for every scheduled email
//! - Recovery of scheduled and in-flight emails after a restart

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod recover;
pub mod sender;
pub mod task;

pub use recover::{recover_pending, RecoveryReport};
pub use sender::{SmtpConfig, SmtpSender, TlsMode};
pub use task::{email_job_id, schedule_email, DispatchOutcome, EmailDispatchTask};

mod prelude;

// vim: ts=4
