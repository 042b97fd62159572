//! In-process cache adapter.
//!
//! A single mutex-guarded map of expiring integer entries. Counters and processing
//! locks share the map; a lock is an entry holding the token of its holder. Expired
//! entries are treated as absent and swept lazily on write.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration, Instant},
};

use cadence::{cache_adapter::CacheAdapter, prelude::*};

/// Sweep expired entries once the map grows past this many keys
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Entry {
	value: u64,
	expires_at: Instant,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at > now
	}
}

#[derive(Debug, Default)]
pub struct CacheAdapterMemory {
	entries: Mutex<HashMap<Box<str>, Entry>>,
	last_token: AtomicU64,
}

impl CacheAdapterMemory {
	pub fn new() -> Self {
		Self::default()
	}

	fn sweep(entries: &mut HashMap<Box<str>, Entry>, now: Instant) {
		if entries.len() > SWEEP_THRESHOLD {
			let before = entries.len();
			entries.retain(|_, entry| entry.is_live(now));
			debug!("Cache sweep removed {} expired entries", before - entries.len());
		}
	}
}

#[async_trait]
impl CacheAdapter for CacheAdapterMemory {
	async fn get_count(&self, key: &str) -> ClResult<Option<u64>> {
		let now = Instant::now();
		let entries = self.entries.lock();
		Ok(entries.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value))
	}

	async fn incr(&self, key: &str, ttl: Duration) -> ClResult<u64> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		Self::sweep(&mut entries, now);
		let value = match entries.get_mut(key) {
			Some(entry) if entry.is_live(now) => {
				entry.value += 1;
				entry.value
			}
			_ => {
				entries.insert(key.into(), Entry { value: 1, expires_at: now + ttl });
				1
			}
		};
		Ok(value)
	}

	async fn set_count(&self, key: &str, value: u64, ttl: Duration) -> ClResult<()> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		Self::sweep(&mut entries, now);
		entries.insert(key.into(), Entry { value, expires_at: now + ttl });
		Ok(())
	}

	async fn raise_count(&self, key: &str, value: u64, ttl: Duration) -> ClResult<u64> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		Self::sweep(&mut entries, now);
		let value = match entries.get_mut(key) {
			Some(entry) if entry.is_live(now) => {
				entry.value = entry.value.max(value);
				entry.value
			}
			_ => {
				entries.insert(key.into(), Entry { value, expires_at: now + ttl });
				value
			}
		};
		Ok(value)
	}

	async fn acquire(&self, key: &str, ttl: Duration) -> ClResult<Option<u64>> {
		let now = Instant::now();
		let mut entries = self.entries.lock();
		if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
			return Ok(None);
		}
		Self::sweep(&mut entries, now);
		let token = self.last_token.fetch_add(1, Ordering::Relaxed) + 1;
		entries.insert(key.into(), Entry { value: token, expires_at: now + ttl });
		Ok(Some(token))
	}

	async fn release(&self, key: &str, token: u64) -> ClResult<()> {
		let mut entries = self.entries.lock();
		if entries.get(key).is_some_and(|entry| entry.value == token) {
			entries.remove(key);
		} else {
			debug!("Lock {} no longer held by token {}, not released", key, token);
		}
		Ok(())
	}
}


// vim: ts=4
