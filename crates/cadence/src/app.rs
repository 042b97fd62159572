//! App builder and runtime lifecycle

use std::{future::Future, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use cadence_core::app::{Adapters, AppOpts, AppState, VERSION};
use cadence_core::scheduler::RetryPolicy;
use cadence_core::worker::WorkerPool;
use cadence_email::{recover_pending, RecoveryReport};
use cadence_types::cache_adapter::CacheAdapter;
use cadence_types::job_adapter::JobAdapter;
use cadence_types::mail_transport::MailTransport;

pub struct AppBuilder {
	opts: AppOpts,
	health_interval: Duration,
	job_adapter: Option<Arc<dyn JobAdapter>>,
	cache_adapter: Option<Arc<dyn CacheAdapter>>,
	transport: Option<Arc<dyn MailTransport>>,
}

impl AppBuilder {
	pub fn new() -> Self {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			opts: AppOpts::default(),
			health_interval: Duration::from_secs(60),
			job_adapter: None,
			cache_adapter: None,
			transport: None,
		}
	}

	// Opts
	pub fn max_emails_per_hour(&mut self, max: u32) -> &mut Self {
		self.opts.max_emails_per_hour = max;
		self
	}

	pub fn min_delay_between_emails(&mut self, delay: Duration) -> &mut Self {
		self.opts.min_delay_between_emails = delay;
		self
	}

	pub fn worker_concurrency(&mut self, concurrency: usize) -> &mut Self {
		self.opts.worker_concurrency = concurrency;
		self
	}

	pub fn fail_open(&mut self, fail_open: bool) -> &mut Self {
		self.opts.fail_open = fail_open;
		self
	}

	pub fn processing_lock_ttl(&mut self, ttl: Duration) -> &mut Self {
		self.opts.processing_lock_ttl = ttl;
		self
	}

	pub fn drain_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.opts.drain_timeout = timeout;
		self
	}

	pub fn retry_policy(&mut self, retry: RetryPolicy) -> &mut Self {
		self.opts.retry = retry;
		self
	}

	pub fn queue_jobs_per_hour(&mut self, max: u32) -> &mut Self {
		self.opts.queue_jobs_per_hour = max;
		self
	}

	pub fn health_interval(&mut self, interval: Duration) -> &mut Self {
		self.health_interval = interval;
		self
	}

	// Adapters
	pub fn job_adapter(&mut self, job_adapter: Arc<dyn JobAdapter>) -> &mut Self {
		self.job_adapter = Some(job_adapter);
		self
	}

	pub fn cache_adapter(&mut self, cache_adapter: Arc<dyn CacheAdapter>) -> &mut Self {
		self.cache_adapter = Some(cache_adapter);
		self
	}

	pub fn transport(&mut self, transport: Arc<dyn MailTransport>) -> &mut Self {
		self.transport = Some(transport);
		self
	}

	pub fn build(self) -> ClResult<Runtime> {
		info!("Cadence V{}", VERSION);

		let Some(job_adapter) = self.job_adapter else {
			error!("FATAL: No job adapter configured");
			return Err(Error::ConfigError("No job adapter configured".into()));
		};
		let Some(cache_adapter) = self.cache_adapter else {
			error!("FATAL: No cache adapter configured");
			return Err(Error::ConfigError("No cache adapter configured".into()));
		};
		let Some(transport) = self.transport else {
			error!("FATAL: No mail transport configured");
			return Err(Error::ConfigError("No mail transport configured".into()));
		};
		if self.opts.worker_concurrency == 0 {
			error!("FATAL: Worker concurrency must be at least 1");
			return Err(Error::ConfigError("worker concurrency must be at least 1".into()));
		}
		if self.opts.max_emails_per_hour == 0 {
			error!("FATAL: Hourly email limit must be at least 1");
			return Err(Error::ConfigError("max emails per hour must be at least 1".into()));
		}

		info!(
			"Limits: {} emails/user/hour, {:?} between sends, {} workers, fail-open: {}",
			self.opts.max_emails_per_hour,
			self.opts.min_delay_between_emails,
			self.opts.worker_concurrency,
			self.opts.fail_open
		);
		let app = AppState::new(Adapters { job_adapter, cache_adapter, transport }, self.opts);
		Ok(Runtime { app, health_interval: self.health_interval, pool: None, health: None })
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Owns the app state and the background tasks started on it
pub struct Runtime {
	app: App,
	health_interval: Duration,
	pool: Option<WorkerPool>,
	health: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Runtime {
	pub fn app(&self) -> &App {
		&self.app
	}

	/// Prime the rate counter cache from the durable counters of the current window.
	/// Must run before the worker pool starts.
	pub async fn rebuild_rate_state_on_restart(&self) -> ClResult<usize> {
		if self.pool.is_some() {
			return Err(Error::Internal("rate state rebuilt after the worker pool started".into()));
		}
		self.app.rate_tracker.rebuild_from_durable_store().await
	}

	pub fn start_worker_pool(&mut self) -> ClResult<()> {
		if self.pool.is_some() {
			return Err(Error::Internal("worker pool already started".into()));
		}
		let pool =
			WorkerPool::start(self.app.queue.clone(), self.app.clone(), self.app.opts.worker_concurrency)?;
		self.pool = Some(pool);

		let token = CancellationToken::new();
		let handle = tokio::spawn(log_health(self.app.clone(), self.health_interval, token.clone()));
		self.health = Some((token, handle));
		Ok(())
	}

	/// Restore state from the stores and start dispatching
	pub async fn start(&mut self) -> ClResult<RecoveryReport> {
		match self.rebuild_rate_state_on_restart().await {
			Ok(_) => {}
			// Cache misses fall back to the durable counters
			Err(e) => warn!("Failed to rebuild rate counters: {}", e),
		}
		let report = recover_pending(&self.app).await.map_err(|e| {
			error!("FATAL: Recovery failed: {}", e);
			e
		})?;
		self.start_worker_pool()?;
		Ok(report)
	}

	/// Stop dispatching and wait for in-flight sends, up to the configured drain timeout
	pub async fn drain_and_close(mut self) -> ClResult<()> {
		if let Some((token, handle)) = self.health.take() {
			token.cancel();
			if let Err(e) = handle.await {
				warn!("Health logger ended abnormally: {}", e);
			}
		}
		match self.pool.take() {
			Some(pool) => pool.drain_and_close(self.app.opts.drain_timeout).await,
			None => Ok(()),
		}
	}

	/// Start, run until `shutdown` resolves, then drain
	pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> ClResult<()> {
		self.start().await?;
		shutdown.await;
		info!("Shutting down");
		self.drain_and_close().await
	}
}

async fn log_health(app: App, interval: Duration, token: CancellationToken) {
	let mut ticker = tokio::time::interval(interval);
	ticker.tick().await;
	loop {
		tokio::select! {
			() = token.cancelled() => break,
			_ = ticker.tick() => match app.queue.health() {
				Ok(health) => info!(
					pending = health.pending,
					running = health.running,
					next_due = ?health.next_due,
					"Queue health"
				),
				Err(e) => warn!("Queue health unavailable: {}", e),
			},
		}
	}
}

// vim: ts=4
