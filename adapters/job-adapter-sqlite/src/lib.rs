//! SQLite job store for Cadence.
//!
//! Campaigns, their scheduled emails and the durable hourly send counters live in a
//! single WAL-mode database file. Timestamps are stored as Unix milliseconds.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;

use cadence::job_adapter::*;
use cadence::prelude::*;

mod campaign;
mod email;
mod rate_window;
mod schema;
mod utils;

use crate::utils::inspect;

// Transaction
//*************
pub struct JobTransactionSqlite {
	tx: sqlx::Transaction<'static, sqlx::Sqlite>,
}

#[async_trait]
impl JobTransaction for JobTransactionSqlite {
	async fn insert_campaign(&mut self, campaign: &NewCampaign<'_>) -> ClResult<CampaignId> {
		campaign::create(&mut self.tx, campaign).await
	}

	async fn insert_email(&mut self, email: &NewEmail<'_>) -> ClResult<EmailId> {
		email::create(&mut self.tx, email).await
	}

	async fn update_email_job_id(&mut self, email_id: EmailId, job_id: &str) -> ClResult<()> {
		email::update_job_id(&mut self.tx, email_id, job_id).await
	}

	async fn update_campaign_status(
		&mut self,
		campaign_id: CampaignId,
		status: CampaignStatus,
	) -> ClResult<()> {
		campaign::update_status(&mut self.tx, campaign_id, status).await
	}

	async fn commit(self: Box<Self>) -> ClResult<()> {
		self.tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)
	}

	async fn rollback(self: Box<Self>) -> ClResult<()> {
		self.tx.rollback().await.inspect_err(inspect).map_err(|_| Error::DbError)
	}
}

// Adapter
//*********
#[derive(Debug)]
pub struct JobAdapterSqlite {
	db: SqlitePool,
}

impl JobAdapterSqlite {
	/// Open (or create) `jobs.db` in the given directory
	pub async fn new(path: impl AsRef<Path>) -> ClResult<Self> {
		tokio::fs::create_dir_all(path.as_ref()).await?;
		let db_path = path.as_ref().join("jobs.db");
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(&db_path)
			.create_if_missing(true)
			.foreign_keys(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		schema::init_db(&db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;
		info!("Job store opened at {}", db_path.display());

		Ok(Self { db })
	}
}

#[async_trait]
impl JobAdapter for JobAdapterSqlite {
	async fn begin(&self) -> ClResult<Box<dyn JobTransaction>> {
		let tx = self.db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
		Ok(Box::new(JobTransactionSqlite { tx }))
	}

	// Campaigns
	//***********
	async fn read_campaign(&self, campaign_id: CampaignId) -> ClResult<Campaign> {
		campaign::read(&self.db, campaign_id).await
	}

	async fn list_campaigns(&self, user_id: UserId) -> ClResult<Vec<Campaign>> {
		campaign::list(&self.db, user_id).await
	}

	async fn adjust_campaign_counts(
		&self,
		campaign_id: CampaignId,
		sent_delta: i64,
		failed_delta: i64,
	) -> ClResult<()> {
		campaign::adjust_counts(&self.db, campaign_id, sent_delta, failed_delta).await
	}

	async fn delete_campaign(&self, campaign_id: CampaignId) -> ClResult<()> {
		campaign::delete(&self.db, campaign_id).await
	}

	// Scheduled emails
	//******************
	async fn read_email(&self, email_id: EmailId) -> ClResult<ScheduledEmail> {
		email::read(&self.db, email_id).await
	}

	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
		email::list(&self.db, opts).await
	}

	async fn update_email(&self, email_id: EmailId, patch: &EmailPatch) -> ClResult<()> {
		email::update(&self.db, email_id, patch).await
	}

	async fn record_email_failure(&self, email_id: EmailId, error: &str) -> ClResult<()> {
		email::record_failure(&self.db, email_id, error).await
	}

	async fn email_stats(&self, user_id: UserId) -> ClResult<EmailStats> {
		email::stats(&self.db, user_id).await
	}

	// Rate windows
	//**************
	async fn increment_rate_window(
		&self,
		user_id: UserId,
		window_start: Timestamp,
	) -> ClResult<u64> {
		rate_window::increment(&self.db, user_id, window_start).await
	}

	async fn read_rate_window(&self, user_id: UserId, window_start: Timestamp) -> ClResult<u64> {
		rate_window::read(&self.db, user_id, window_start).await
	}

	async fn list_rate_windows(&self, window_start: Timestamp) -> ClResult<Vec<RateWindow>> {
		rate_window::list(&self.db, window_start).await
	}
}

// vim: ts=4
