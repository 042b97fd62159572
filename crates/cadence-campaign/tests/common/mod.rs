//! Shared fixtures for the campaign integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use cadence_cache_adapter_memory::CacheAdapterMemory;
use cadence_campaign::CreateCampaign;
use cadence_core::{Adapters, App, AppOpts, AppState};
use cadence_job_adapter_sqlite::JobAdapterSqlite;
use cadence_types::job_adapter::*;
use cadence_types::mail_transport::{EmailMessage, MailTransport};
use cadence_types::prelude::*;

#[derive(Debug, Default)]
pub struct RecordingTransport {
	pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
	async fn send(&self, message: &EmailMessage) -> ClResult<()> {
		self.sent.lock().unwrap().push(message.to.clone());
		Ok(())
	}
}

/// Job store whose transactions fail on the n-th email insert
#[derive(Debug)]
pub struct FailingStore {
	pub inner: JobAdapterSqlite,
	pub fail_on_email: usize,
}

struct FailingTx {
	inner: Box<dyn JobTransaction>,
	fail_on_email: usize,
	emails: usize,
}

#[async_trait]
impl JobTransaction for FailingTx {
	async fn insert_campaign(&mut self, campaign: &NewCampaign<'_>) -> ClResult<CampaignId> {
		self.inner.insert_campaign(campaign).await
	}
	async fn insert_email(&mut self, email: &NewEmail<'_>) -> ClResult<EmailId> {
		self.emails += 1;
		if self.emails == self.fail_on_email {
			return Err(Error::DbError);
		}
		self.inner.insert_email(email).await
	}
	async fn update_email_job_id(&mut self, email_id: EmailId, job_id: &str) -> ClResult<()> {
		self.inner.update_email_job_id(email_id, job_id).await
	}
	async fn update_campaign_status(
		&mut self,
		campaign_id: CampaignId,
		status: CampaignStatus,
	) -> ClResult<()> {
		self.inner.update_campaign_status(campaign_id, status).await
	}
	async fn commit(self: Box<Self>) -> ClResult<()> {
		self.inner.commit().await
	}
	async fn rollback(self: Box<Self>) -> ClResult<()> {
		self.inner.rollback().await
	}
}

#[async_trait]
impl JobAdapter for FailingStore {
	async fn begin(&self) -> ClResult<Box<dyn JobTransaction>> {
		let inner = self.inner.begin().await?;
		Ok(Box::new(FailingTx { inner, fail_on_email: self.fail_on_email, emails: 0 }))
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

fn build_app(job_adapter: Arc<dyn JobAdapter>, transport: Arc<RecordingTransport>) -> App {
	let opts = AppOpts { min_delay_between_emails: Duration::ZERO, ..AppOpts::default() };
	AppState::new(
		Adapters { job_adapter, cache_adapter: Arc::new(CacheAdapterMemory::new()), transport },
		opts,
	)
}

pub async fn create_app() -> (App, Arc<RecordingTransport>, TempDir) {
	let _ = tracing_subscriber::fmt().try_init();
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let store = JobAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let transport = Arc::new(RecordingTransport::default());
	(build_app(Arc::new(store), transport.clone()), transport, temp_dir)
}

pub async fn create_failing_app(fail_on_email: usize) -> (App, TempDir) {
	let _ = tracing_subscriber::fmt().try_init();
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let inner = JobAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let store = FailingStore { inner, fail_on_email };
	(build_app(Arc::new(store), Arc::new(RecordingTransport::default())), temp_dir)
}

pub fn request(recipients: &[&str], start_time: Timestamp, delay: u64) -> CreateCampaign {
	CreateCampaign {
		subject: "Spring sale".into(),
		body: "Hello\nEverything is 20% off".into(),
		recipients: recipients.iter().map(ToString::to_string).collect(),
		start_time,
		delay_between_emails: delay,
		hourly_limit: 100,
	}
}

// vim: ts=4
