mod config;

use std::sync::Arc;

use cadence::email::SmtpSender;
use cadence::prelude::*;
use cadence::AppBuilder;
use cadence_cache_adapter_memory::CacheAdapterMemory;
use cadence_job_adapter_sqlite::JobAdapterSqlite;

use crate::config::Config;

#[tokio::main]
async fn main() -> ClResult<()> {
	let mut builder = AppBuilder::new();
	let config = Config::from_env().inspect_err(|e| error!("FATAL: {}", e))?;

	let job_adapter = JobAdapterSqlite::new(&config.db_dir).await?;
	let transport = SmtpSender::new(&config.smtp)?;
	transport.verify().await;

	builder
		.job_adapter(Arc::new(job_adapter))
		.cache_adapter(Arc::new(CacheAdapterMemory::new()))
		.transport(Arc::new(transport))
		.max_emails_per_hour(config.max_emails_per_hour)
		.queue_jobs_per_hour(config.queue_jobs_per_hour)
		.min_delay_between_emails(config.min_delay_between_emails)
		.worker_concurrency(config.worker_concurrency)
		.fail_open(config.fail_open)
		.processing_lock_ttl(config.processing_lock_ttl)
		.drain_timeout(config.drain_timeout)
		.retry_policy(config.retry);

	builder
		.build()?
		.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				error!("Failed to listen for shutdown signal: {}", e);
			}
		})
		.await
}

// vim: ts=4
