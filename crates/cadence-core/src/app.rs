//! App state type

use std::{sync::Arc, time::Duration};

use crate::rate_limit::RateTracker;
use crate::scheduler::{DelayQueue, RetryPolicy};

use cadence_types::cache_adapter::CacheAdapter;
use cadence_types::job_adapter::JobAdapter;
use cadence_types::mail_transport::MailTransport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub queue: Arc<DelayQueue<App>>,
	pub rate_tracker: RateTracker,
	pub opts: AppOpts,

	pub job_adapter: Arc<dyn JobAdapter>,
	pub cache_adapter: Arc<dyn CacheAdapter>,
	pub transport: Arc<dyn MailTransport>,
}

pub type App = Arc<AppState>;

impl AppState {
	pub fn new(adapters: Adapters, opts: AppOpts) -> App {
		let queue = DelayQueue::new(opts.queue_jobs_per_hour);
		let rate_tracker = RateTracker::new(
			adapters.cache_adapter.clone(),
			adapters.job_adapter.clone(),
			opts.fail_open,
		);
		Arc::new(Self {
			queue,
			rate_tracker,
			opts,
			job_adapter: adapters.job_adapter,
			cache_adapter: adapters.cache_adapter,
			transport: adapters.transport,
		})
	}
}

pub struct Adapters {
	pub job_adapter: Arc<dyn JobAdapter>,
	pub cache_adapter: Arc<dyn CacheAdapter>,
	pub transport: Arc<dyn MailTransport>,
}

#[derive(Debug, Clone)]
pub struct AppOpts {
	/// Global cap on sends per user per hour, campaigns may only lower it
	pub max_emails_per_hour: u32,
	/// Pause before every send
	pub min_delay_between_emails: Duration,
	pub worker_concurrency: usize,
	/// Allow sends when the rate counter cannot be read
	pub fail_open: bool,
	pub processing_lock_ttl: Duration,
	pub drain_timeout: Duration,
	pub retry: RetryPolicy,
	/// Aggregate dispatch ceiling of the delay queue across all users (0: none)
	pub queue_jobs_per_hour: u32,
}

impl Default for AppOpts {
	fn default() -> Self {
		Self {
			max_emails_per_hour: 200,
			min_delay_between_emails: Duration::from_millis(2000),
			worker_concurrency: 5,
			fail_open: true,
			processing_lock_ttl: Duration::from_secs(300),
			drain_timeout: Duration::from_secs(30),
			retry: RetryPolicy::default(),
			queue_jobs_per_hour: 200,
		}
	}
}

// vim: ts=4
