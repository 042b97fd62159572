//! Shared fixtures for the dispatch integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use cadence_cache_adapter_memory::CacheAdapterMemory;
use cadence_core::{Adapters, App, AppOpts, AppState};
use cadence_job_adapter_sqlite::JobAdapterSqlite;
use cadence_types::cache_adapter::CacheAdapter;
use cadence_types::job_adapter::*;
use cadence_types::mail_transport::{EmailMessage, MailTransport};
use cadence_types::prelude::*;

/// Records every message, refusing the recipients in `fail_for`
#[derive(Debug, Default)]
pub struct FakeTransport {
	pub sent: Mutex<Vec<EmailMessage>>,
	pub fail_for: Mutex<HashSet<String>>,
}

impl FakeTransport {
	pub fn failing_for(recipients: &[&str]) -> Self {
		let transport = Self::default();
		transport.fail_for.lock().unwrap().extend(recipients.iter().map(ToString::to_string));
		transport
	}

	pub fn sent_to(&self) -> Vec<String> {
		self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
	}
}

#[async_trait]
impl MailTransport for FakeTransport {
	async fn send(&self, message: &EmailMessage) -> ClResult<()> {
		if self.fail_for.lock().unwrap().contains(&message.to) {
			return Err(Error::ServiceUnavailable("SMTP send failed: 550 mailbox unavailable".into()));
		}
		self.sent.lock().unwrap().push(message.clone());
		Ok(())
	}
}

/// Cache that refuses every operation
#[derive(Debug)]
pub struct DownCache;

#[async_trait]
impl CacheAdapter for DownCache {
	async fn get_count(&self, _key: &str) -> ClResult<Option<u64>> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
	async fn incr(&self, _key: &str, _ttl: Duration) -> ClResult<u64> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
	async fn set_count(&self, _key: &str, _value: u64, _ttl: Duration) -> ClResult<()> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
	async fn raise_count(&self, _key: &str, _value: u64, _ttl: Duration) -> ClResult<u64> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
	async fn acquire(&self, _key: &str, _ttl: Duration) -> ClResult<Option<u64>> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
	async fn release(&self, _key: &str, _token: u64) -> ClResult<()> {
		Err(Error::ServiceUnavailable("cache down".into()))
	}
}

/// Job store refusing the next `fail_sent_updates` updates of an email to `sent`
#[derive(Debug)]
pub struct SentUpdateFailingStore {
	pub inner: JobAdapterSqlite,
	pub fail_sent_updates: AtomicUsize,
}

#[async_trait]
impl JobAdapter for SentUpdateFailingStore {
	async fn begin(&self) -> ClResult<Box<dyn JobTransaction>> {
		self.inner.begin().await
	}
	async fn read_campaign(&self, campaign_id: CampaignId) -> ClResult<Campaign> {
		self.inner.read_campaign(campaign_id).await
	}
	async fn list_campaigns(&self, user_id: UserId) -> ClResult<Vec<Campaign>> {
		self.inner.list_campaigns(user_id).await
	}
	async fn adjust_campaign_counts(
		&self,
		campaign_id: CampaignId,
		sent_delta: i64,
		failed_delta: i64,
	) -> ClResult<()> {
		self.inner.adjust_campaign_counts(campaign_id, sent_delta, failed_delta).await
	}
	async fn delete_campaign(&self, campaign_id: CampaignId) -> ClResult<()> {
		self.inner.delete_campaign(campaign_id).await
	}
	async fn read_email(&self, email_id: EmailId) -> ClResult<ScheduledEmail> {
		self.inner.read_email(email_id).await
	}
	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
		self.inner.list_emails(opts).await
	}
	async fn update_email(&self, email_id: EmailId, patch: &EmailPatch) -> ClResult<()> {
		if matches!(patch.status, Patch::Value(EmailStatus::Sent))
			&& self
				.fail_sent_updates
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
		{
			return Err(Error::DbError);
		}
		self.inner.update_email(email_id, patch).await
	}
	async fn record_email_failure(&self, email_id: EmailId, error: &str) -> ClResult<()> {
		self.inner.record_email_failure(email_id, error).await
	}
	async fn email_stats(&self, user_id: UserId) -> ClResult<EmailStats> {
		self.inner.email_stats(user_id).await
	}
	async fn increment_rate_window(&self, user_id: UserId, window_start: Timestamp) -> ClResult<u64> {
		self.inner.increment_rate_window(user_id, window_start).await
	}
	async fn read_rate_window(&self, user_id: UserId, window_start: Timestamp) -> ClResult<u64> {
		self.inner.read_rate_window(user_id, window_start).await
	}
	async fn list_rate_windows(&self, window_start: Timestamp) -> ClResult<Vec<RateWindow>> {
		self.inner.list_rate_windows(window_start).await
	}
}

pub fn test_opts() -> AppOpts {
	AppOpts { min_delay_between_emails: Duration::ZERO, ..AppOpts::default() }
}

pub async fn create_app_with(
	opts: AppOpts,
	transport: Arc<FakeTransport>,
	cache: Arc<dyn CacheAdapter>,
) -> (App, TempDir) {
	let _ = tracing_subscriber::fmt().try_init();
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let job_adapter = JobAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let app = AppState::new(
		Adapters { job_adapter: Arc::new(job_adapter), cache_adapter: cache, transport },
		opts,
	);
	(app, temp_dir)
}

/// App whose store fails the first `fail_sent_updates` updates to `sent`
pub async fn create_app_failing_sent_updates(
	opts: AppOpts,
	transport: Arc<FakeTransport>,
	fail_sent_updates: usize,
) -> (App, TempDir) {
	let _ = tracing_subscriber::fmt().try_init();
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let inner = JobAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let store = SentUpdateFailingStore { inner, fail_sent_updates: AtomicUsize::new(fail_sent_updates) };
	let app = AppState::new(
		Adapters {
			job_adapter: Arc::new(store),
			cache_adapter: Arc::new(CacheAdapterMemory::new()),
			transport,
		},
		opts,
	);
	(app, temp_dir)
}

pub async fn create_app(opts: AppOpts, transport: Arc<FakeTransport>) -> (App, TempDir) {
	create_app_with(opts, transport, Arc::new(CacheAdapterMemory::new())).await
}

/// Persists a campaign with one email per recipient, `delay` ms apart from `start`
pub async fn seed_campaign(
	app: &App,
	user_id: UserId,
	recipients: &[&str],
	start: Timestamp,
	delay: u64,
	hourly_limit: u32,
) -> (CampaignId, Vec<ScheduledEmail>) {
	let mut tx = app.job_adapter.begin().await.unwrap();
	let campaign_id = tx
		.insert_campaign(&NewCampaign {
			user_id,
			subject: "Spring sale",
			body: "Hello\nEverything is 20% off",
			start_time: start,
			delay_between_emails: delay,
			hourly_limit,
			total_emails: u32::try_from(recipients.len()).unwrap(),
		})
		.await
		.unwrap();

	let mut ids = Vec::new();
	for (i, recipient) in recipients.iter().enumerate() {
		let email_id = tx
			.insert_email(&NewEmail {
				campaign_id,
				user_id,
				recipient,
				subject: "Spring sale",
				body: "Hello\nEverything is 20% off",
				scheduled_time: start.add_millis(i as i64 * delay as i64),
			})
			.await
			.unwrap();
		tx.update_email_job_id(email_id, &format!("email-{}", email_id)).await.unwrap();
		ids.push(email_id);
	}
	tx.update_campaign_status(campaign_id, CampaignStatus::InProgress).await.unwrap();
	tx.commit().await.unwrap();

	let mut emails = Vec::new();
	for id in ids {
		emails.push(app.job_adapter.read_email(id).await.unwrap());
	}
	(campaign_id, emails)
}

// vim: ts=4
