//! Fast volatile cache adapter trait.
//!
//! Backs the hot copy of the hourly send counters and the per-email processing locks.
//! Every entry carries its own expiry.

use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::prelude::*;

#[async_trait]
pub trait CacheAdapter: Debug + Send + Sync {
	/// Current value of a counter, `None` if absent or expired
	async fn get_count(&self, key: &str) -> ClResult<Option<u64>>;

	/// Atomically increments a counter and returns the new value.
	/// The expiry is set only when the increment creates the entry.
	async fn incr(&self, key: &str, ttl: Duration) -> ClResult<u64>;

	/// Overwrites a counter and resets its expiry
	async fn set_count(&self, key: &str, value: u64, ttl: Duration) -> ClResult<()>;

	/// Atomically raises a counter to at least `value` and returns the result.
	/// A live entry keeps its expiry, a missing one is created with `ttl`.
	async fn raise_count(&self, key: &str, value: u64, ttl: Duration) -> ClResult<u64>;

	/// Set-if-absent. Returns a token for this hold if the key was free, `None` if it is held.
	async fn acquire(&self, key: &str, ttl: Duration) -> ClResult<Option<u64>>;

	/// Drops a hold taken by `acquire`. Nothing happens if the key expired and is now
	/// held under another token.
	async fn release(&self, key: &str, token: u64) -> ClResult<()>;
}

// vim: ts=4
