//! Campaign records and their aggregate counts

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use cadence::job_adapter::*;
use cadence::prelude::*;

use crate::utils::*;

const CAMPAIGN_COLS: &str = "campaign_id, user_id, subject, body, start_time, delay_between_emails,
	hourly_limit, total_emails, sent_count, failed_count, status, created_at, updated_at";

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign, sqlx::Error> {
	let status: &str = row.try_get("status")?;
	Ok(Campaign {
		campaign_id: get_u64(row, "campaign_id")?,
		user_id: UserId(get_u64(row, "user_id")?),
		subject: row.try_get("subject")?,
		body: row.try_get("body")?,
		start_time: row.try_get("start_time").map(Timestamp)?,
		delay_between_emails: get_u64(row, "delay_between_emails")?,
		hourly_limit: get_u32(row, "hourly_limit")?,
		total_emails: get_u32(row, "total_emails")?,
		sent_count: get_u32(row, "sent_count")?,
		failed_count: get_u32(row, "failed_count")?,
		status: parse_col(status)?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		updated_at: row.try_get("updated_at").map(Timestamp)?,
	})
}

pub(crate) async fn read(db: &SqlitePool, campaign_id: CampaignId) -> ClResult<Campaign> {
	let res = sqlx::query(&format!("SELECT {} FROM campaigns WHERE campaign_id=?", CAMPAIGN_COLS))
		.bind(campaign_id as i64)
		.fetch_one(db)
		.await;

	map_res(res, |row| campaign_from_row(&row))
}

/// Campaigns of a user, newest first
pub(crate) async fn list(db: &SqlitePool, user_id: UserId) -> ClResult<Vec<Campaign>> {
	let res = sqlx::query(&format!(
		"SELECT {} FROM campaigns WHERE user_id=? ORDER BY created_at DESC, campaign_id DESC",
		CAMPAIGN_COLS
	))
	.bind(user_id.0 as i64)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	collect_res(res.iter().map(campaign_from_row))
}

pub(crate) async fn create(conn: &mut SqliteConnection, campaign: &NewCampaign<'_>) -> ClResult<CampaignId> {
	let now = Timestamp::now();
	let res = sqlx::query(
		"INSERT INTO campaigns (user_id, subject, body, start_time, delay_between_emails,
		hourly_limit, total_emails, status, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?) RETURNING campaign_id",
	)
	.bind(campaign.user_id.0 as i64)
	.bind(campaign.subject)
	.bind(campaign.body)
	.bind(campaign.start_time.0)
	.bind(campaign.delay_between_emails as i64)
	.bind(i64::from(campaign.hourly_limit))
	.bind(i64::from(campaign.total_emails))
	.bind(now.0)
	.bind(now.0)
	.fetch_one(conn)
	.await
	.map_err(map_write_err)?;

	let campaign_id: i64 = res.get(0);
	Ok(campaign_id as u64)
}

pub(crate) async fn update_status(
	conn: &mut SqliteConnection,
	campaign_id: CampaignId,
	status: CampaignStatus,
) -> ClResult<()> {
	let res = sqlx::query("UPDATE campaigns SET status=?, updated_at=? WHERE campaign_id=?")
		.bind(status.as_str())
		.bind(Timestamp::now().0)
		.bind(campaign_id as i64)
		.execute(conn)
		.await
		.map_err(map_write_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Apply count deltas and recompute the status in a single statement
pub(crate) async fn adjust_counts(
	db: &SqlitePool,
	campaign_id: CampaignId,
	sent_delta: i64,
	failed_delta: i64,
) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE campaigns SET
			sent_count = MAX(sent_count + ?1, 0),
			failed_count = MAX(failed_count + ?2, 0),
			status = CASE
				WHEN MAX(sent_count + ?1, 0) + MAX(failed_count + ?2, 0) >= total_emails
					THEN CASE WHEN MAX(sent_count + ?1, 0) > 0 THEN 'completed' ELSE 'failed' END
				ELSE status
			END,
			updated_at = ?3
		WHERE campaign_id = ?4",
	)
	.bind(sent_delta)
	.bind(failed_delta)
	.bind(Timestamp::now().0)
	.bind(campaign_id as i64)
	.execute(db)
	.await
	.map_err(map_write_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

/// Delete a campaign, its emails go with it (ON DELETE CASCADE)
pub(crate) async fn delete(db: &SqlitePool, campaign_id: CampaignId) -> ClResult<()> {
	let res = sqlx::query("DELETE FROM campaigns WHERE campaign_id=?")
		.bind(campaign_id as i64)
		.execute(db)
		.await
		.map_err(map_write_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

// vim: ts=4
