//! Shared types, adapter traits, and core utilities for the Cadence scheduler.
//!
//! This crate contains the foundational types that are shared between the
//! feature crates and all adapter implementations. Keeping the adapter traits
//! here lets the adapters compile without depending on the scheduler itself.

pub mod cache_adapter;
pub mod error;
pub mod job_adapter;
pub mod mail_transport;
pub mod prelude;
pub mod types;

// vim: ts=4
