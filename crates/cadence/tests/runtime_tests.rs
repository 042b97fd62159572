//! Builder validation and the start → recover → dispatch → drain lifecycle

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use cadence::cache_adapter::CacheAdapter;
use cadence::campaign::{create_campaign, get_campaign, CreateCampaign};
use cadence::job_adapter::CampaignStatus;
use cadence::mail_transport::{EmailMessage, MailTransport};
use cadence::prelude::*;
use cadence::rate_limit::window_key;
use cadence::{AppBuilder, Runtime};
use cadence_cache_adapter_memory::CacheAdapterMemory;
use cadence_job_adapter_sqlite::JobAdapterSqlite;

#[derive(Debug, Default)]
struct RecordingTransport {
	sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
	async fn send(&self, message: &EmailMessage) -> ClResult<()> {
		self.sent.lock().unwrap().push(message.to.clone());
		Ok(())
	}
}

async fn build_runtime(
	dir: &TempDir,
	cache: Arc<CacheAdapterMemory>,
	transport: Arc<RecordingTransport>,
) -> Runtime {
	let store = JobAdapterSqlite::new(dir.path()).await.unwrap();
	let mut builder = AppBuilder::new();
	builder
		.job_adapter(Arc::new(store))
		.cache_adapter(cache)
		.transport(transport)
		.min_delay_between_emails(Duration::ZERO)
		.worker_concurrency(2)
		.drain_timeout(Duration::from_secs(2));
	builder.build().unwrap()
}

fn request(recipients: &[&str], start_time: Timestamp) -> CreateCampaign {
	CreateCampaign {
		subject: "Launch".into(),
		body: "We are live".into(),
		recipients: recipients.iter().map(ToString::to_string).collect(),
		start_time,
		delay_between_emails: 100,
		hourly_limit: 100,
	}
}

#[tokio::test]
async fn test_build_requires_adapters() {
	let res = AppBuilder::new().build();
	assert!(matches!(res, Err(Error::ConfigError(_))));

	let mut builder = AppBuilder::new();
	builder
		.cache_adapter(Arc::new(CacheAdapterMemory::new()))
		.transport(Arc::new(RecordingTransport::default()));
	assert!(matches!(builder.build(), Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_build_rejects_zero_limits() {
	let dir = TempDir::new().unwrap();
	let store = JobAdapterSqlite::new(dir.path()).await.unwrap();
	let mut builder = AppBuilder::new();
	builder
		.job_adapter(Arc::new(store))
		.cache_adapter(Arc::new(CacheAdapterMemory::new()))
		.transport(Arc::new(RecordingTransport::default()))
		.worker_concurrency(0);
	assert!(matches!(builder.build(), Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_rebuild_primes_cache_from_durable_counts() {
	let dir = TempDir::new().unwrap();
	let cache = Arc::new(CacheAdapterMemory::new());
	let runtime =
		build_runtime(&dir, cache.clone(), Arc::new(RecordingTransport::default())).await;
	let app = runtime.app();

	let window = Timestamp::now().hour_floor();
	for _ in 0..5 {
		app.job_adapter.increment_rate_window(UserId(1), window).await.unwrap();
	}

	assert_eq!(runtime.rebuild_rate_state_on_restart().await.unwrap(), 1);
	let durable = app.job_adapter.read_rate_window(UserId(1), window).await.unwrap();
	let cached = cache.get_count(&window_key(UserId(1), Timestamp::now())).await.unwrap();
	assert_eq!(cached, Some(durable));
	runtime.drain_and_close().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_delivers_campaign() {
	let dir = TempDir::new().unwrap();
	let transport = Arc::new(RecordingTransport::default());
	let mut runtime = build_runtime(&dir, Arc::new(CacheAdapterMemory::new()), transport.clone()).await;

	let report = runtime.start().await.unwrap();
	assert_eq!(report.rescheduled, 0);
	assert!(runtime.start_worker_pool().is_err());

	let app = runtime.app().clone();
	let created = create_campaign(
		&app,
		UserId(1),
		&request(&["a@example.com", "b@example.com"], Timestamp::from_now(50)),
	)
	.await
	.unwrap();

	tokio::time::sleep(Duration::from_millis(700)).await;
	assert_eq!(*transport.sent.lock().unwrap(), vec!["a@example.com", "b@example.com"]);
	let campaign = get_campaign(&app, created.campaign.campaign_id, UserId(1)).await.unwrap();
	assert_eq!(campaign.status, CampaignStatus::Completed);

	runtime.drain_and_close().await.unwrap();
}

#[tokio::test]
async fn test_restart_recovers_scheduled_emails() {
	let dir = TempDir::new().unwrap();
	let start = Timestamp::from_now(3_600_000);

	let campaign_id = {
		let runtime = build_runtime(
			&dir,
			Arc::new(CacheAdapterMemory::new()),
			Arc::new(RecordingTransport::default()),
		)
		.await;
		let created = create_campaign(
			runtime.app(),
			UserId(1),
			&request(&["a@example.com", "b@example.com"], start),
		)
		.await
		.unwrap();
		runtime.drain_and_close().await.unwrap();
		created.campaign.campaign_id
	};

	let mut runtime = build_runtime(
		&dir,
		Arc::new(CacheAdapterMemory::new()),
		Arc::new(RecordingTransport::default()),
	)
	.await;
	let report = runtime.start().await.unwrap();
	assert_eq!(report.rescheduled, 2);

	let health = runtime.app().queue.health().unwrap();
	assert_eq!(health.pending, 2);
	assert_eq!(health.next_due, Some(start));
	let campaign = get_campaign(runtime.app(), campaign_id, UserId(1)).await.unwrap();
	assert_eq!(campaign.status, CampaignStatus::InProgress);

	runtime.drain_and_close().await.unwrap();
}
