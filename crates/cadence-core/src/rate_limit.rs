//! Hour-window rate tracker.
//!
//! Counts sends per user per UTC clock hour. The hot copy lives in the cache adapter
//! (expiring after two windows), the durable copy in the job store, so the count
//! survives process restarts.

use std::{sync::Arc, time::Duration};

use crate::prelude::*;
use cadence_types::cache_adapter::CacheAdapter;
use cadence_types::job_adapter::JobAdapter;

/// Cache expiry of a window counter (two window widths)
pub const WINDOW_TTL: Duration = Duration::from_secs(2 * 3600);

/// Cache key of the window containing `at`
pub fn window_key(user_id: UserId, at: Timestamp) -> String {
	format!("rate_limit:user:{}:hour:{}", user_id, at.hour_floor())
}

#[derive(Debug)]
pub struct RateTracker {
	cache: Arc<dyn CacheAdapter>,
	store: Arc<dyn JobAdapter>,
	/// Allow sends when the count cannot be read
	fail_open: bool,
}

impl RateTracker {
	pub fn new(cache: Arc<dyn CacheAdapter>, store: Arc<dyn JobAdapter>, fail_open: bool) -> Self {
		Self { cache, store, fail_open }
	}

	/// Sends recorded for the user in the current window.
	/// A cache miss reads the durable count and primes the cache with it.
	pub async fn current_count(&self, user_id: UserId) -> ClResult<u64> {
		let now = Timestamp::now();
		let key = window_key(user_id, now);
		if let Some(count) = self.cache.get_count(&key).await? {
			return Ok(count);
		}

		let durable = self.store.read_rate_window(user_id, now.hour_floor()).await?;
		match self.cache.raise_count(&key, durable, WINDOW_TTL).await {
			Ok(count) => Ok(count),
			Err(err) => {
				warn!("Failed to prime rate counter of user {}: {}", user_id, err);
				Ok(durable)
			}
		}
	}

	pub async fn check_allowed(&self, user_id: UserId, limit: u32) -> bool {
		match self.current_count(user_id).await {
			Ok(count) if count < u64::from(limit) => true,
			Ok(count) => {
				warn!("Rate limit exceeded for user {}: {}/{}", user_id, count, limit);
				false
			}
			Err(err) if self.fail_open => {
				warn!("Rate limit check failed for user {}, allowing: {}", user_id, err);
				true
			}
			Err(err) => {
				error!("Rate limit check failed for user {}, denying: {}", user_id, err);
				false
			}
		}
	}

	/// Records one send in the current window. The cache and the durable row are
	/// updated independently; the call only fails if both fail.
	///
	/// The cache is incremented before the store, so while both are up it is never behind.
	/// A cache entry found behind the durable row (recreated after a miss or an eviction)
	/// is raised to it.
	pub async fn increment(&self, user_id: UserId) -> ClResult<u64> {
		let now = Timestamp::now();
		let key = window_key(user_id, now);
		let cached = self
			.cache
			.incr(&key, WINDOW_TTL)
			.await
			.inspect_err(|err| warn!("Rate counter cache increment failed for user {}: {}", user_id, err));
		let durable = self
			.store
			.increment_rate_window(user_id, now.hour_floor())
			.await
			.inspect_err(|err| warn!("Rate counter store increment failed for user {}: {}", user_id, err));

		match (cached, durable) {
			(Ok(count), Ok(stored)) if stored > count => {
				let count = self.cache.raise_count(&key, stored, WINDOW_TTL).await.unwrap_or_else(|err| {
					warn!("Rate counter cache catch-up failed for user {}: {}", user_id, err);
					stored
				});
				debug!("Rate counter for user {} caught up to {}", user_id, count);
				Ok(count)
			}
			(Ok(count), _) | (Err(_), Ok(count)) => {
				debug!("Rate counter for user {}: {}", user_id, count);
				Ok(count)
			}
			(Err(err), Err(_)) => Err(err),
		}
	}

	/// Now if the user is under quota, otherwise the start of the next hour
	pub async fn next_available_slot(&self, user_id: UserId, limit: u32) -> Timestamp {
		let now = Timestamp::now();
		if self.check_allowed(user_id, limit).await { now } else { now.next_hour() }
	}

	/// Prime the cache from the durable rows of the current window.
	/// Returns the number of counters restored.
	pub async fn rebuild_from_durable_store(&self) -> ClResult<usize> {
		let now = Timestamp::now();
		let rows = self.store.list_rate_windows(now.hour_floor()).await?;
		for row in &rows {
			self.cache
				.set_count(&window_key(row.user_id, row.window_start), row.count, WINDOW_TTL)
				.await?;
		}
		info!("Restored {} rate counters for window {}", rows.len(), now.hour_floor());
		Ok(rows.len())
	}
}


// vim: ts=4
