//! Database schema initialization
//!
//! Creates tables and indexes idempotently on every open.

use sqlx::SqlitePool;

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Campaigns
	//***********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS campaigns (
		campaign_id integer PRIMARY KEY AUTOINCREMENT,
		user_id integer NOT NULL,
		subject text NOT NULL,
		body text NOT NULL,
		start_time integer NOT NULL,
		delay_between_emails integer NOT NULL,
		hourly_limit integer NOT NULL,
		total_emails integer NOT NULL,
		sent_count integer NOT NULL DEFAULT 0,
		failed_count integer NOT NULL DEFAULT 0,
		status text NOT NULL DEFAULT 'pending',
		created_at integer NOT NULL,
		updated_at integer NOT NULL
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_user ON campaigns(user_id, created_at)")
		.execute(&mut *tx)
		.await?;

	// Scheduled emails
	//******************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS scheduled_emails (
		email_id integer PRIMARY KEY AUTOINCREMENT,
		campaign_id integer NOT NULL,
		user_id integer NOT NULL,
		recipient text NOT NULL,
		subject text NOT NULL,
		body text NOT NULL,
		scheduled_time integer NOT NULL,
		status text NOT NULL DEFAULT 'scheduled',
		job_id text,
		sent_at integer,
		error_message text,
		attempts integer NOT NULL DEFAULT 0,
		created_at integer NOT NULL,
		updated_at integer NOT NULL,
		UNIQUE(campaign_id, recipient COLLATE NOCASE),
		FOREIGN KEY(campaign_id) REFERENCES campaigns(campaign_id) ON DELETE CASCADE
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_scheduled_emails_user ON scheduled_emails(user_id, status)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_scheduled_emails_due ON scheduled_emails(status, scheduled_time)",
	)
	.execute(&mut *tx)
	.await?;

	// Rate limit tracking
	//*********************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS rate_limit_tracking (
		user_id integer NOT NULL,
		window_start integer NOT NULL,
		email_count integer NOT NULL DEFAULT 0,
		updated_at integer NOT NULL,
		PRIMARY KEY(user_id, window_start)
	)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
