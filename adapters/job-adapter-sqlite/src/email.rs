//! Scheduled email records

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use cadence::job_adapter::*;
use cadence::prelude::*;

use crate::utils::*;

const EMAIL_COLS: &str = "email_id, campaign_id, user_id, recipient, subject, body, scheduled_time,
	status, job_id, sent_at, error_message, attempts, created_at, updated_at";

fn email_from_row(row: &SqliteRow) -> Result<ScheduledEmail, sqlx::Error> {
	let status: &str = row.try_get("status")?;
	Ok(ScheduledEmail {
		email_id: get_u64(row, "email_id")?,
		campaign_id: get_u64(row, "campaign_id")?,
		user_id: UserId(get_u64(row, "user_id")?),
		recipient: row.try_get("recipient")?,
		subject: row.try_get("subject")?,
		body: row.try_get("body")?,
		scheduled_time: row.try_get("scheduled_time").map(Timestamp)?,
		status: parse_col(status)?,
		job_id: row.try_get("job_id")?,
		sent_at: row.try_get::<Option<i64>, _>("sent_at")?.map(Timestamp),
		error_message: row.try_get("error_message")?,
		attempts: get_u32(row, "attempts")?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		updated_at: row.try_get("updated_at").map(Timestamp)?,
	})
}

pub(crate) async fn read(db: &SqlitePool, email_id: EmailId) -> ClResult<ScheduledEmail> {
	let res =
		sqlx::query(&format!("SELECT {} FROM scheduled_emails WHERE email_id=?", EMAIL_COLS))
			.bind(email_id as i64)
			.fetch_one(db)
			.await;

	map_res(res, |row| email_from_row(&row))
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
	let mut query = sqlx::QueryBuilder::new(format!(
		"SELECT {} FROM scheduled_emails WHERE 1=1",
		EMAIL_COLS
	));
	if let Some(user_id) = opts.user_id {
		query.push(" AND user_id=").push_bind(user_id.0 as i64);
	}
	if let Some(campaign_id) = opts.campaign_id {
		query.push(" AND campaign_id=").push_bind(campaign_id as i64);
	}
	if let Some(statuses) = &opts.status {
		query.push(" AND status IN (");
		let mut separated = query.separated(", ");
		for status in statuses.iter() {
			separated.push_bind(status.as_str());
		}
		separated.push_unseparated(")");
	}
	query.push(match opts.order {
		EmailOrder::ScheduledTime => " ORDER BY scheduled_time ASC, email_id ASC",
		EmailOrder::RecentlySent => " ORDER BY sent_at DESC, updated_at DESC, email_id DESC",
		EmailOrder::Id => " ORDER BY email_id ASC",
	});

	let res = query
		.build()
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	collect_res(res.iter().map(email_from_row))
}

pub(crate) async fn create(conn: &mut SqliteConnection, email: &NewEmail<'_>) -> ClResult<EmailId> {
	let now = Timestamp::now();
	let res = sqlx::query(
		"INSERT INTO scheduled_emails (campaign_id, user_id, recipient, subject, body,
		scheduled_time, status, created_at, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, 'scheduled', ?, ?) RETURNING email_id",
	)
	.bind(email.campaign_id as i64)
	.bind(email.user_id.0 as i64)
	.bind(email.recipient)
	.bind(email.subject)
	.bind(email.body)
	.bind(email.scheduled_time.0)
	.bind(now.0)
	.bind(now.0)
	.fetch_one(conn)
	.await
	.map_err(map_write_err)?;

	let email_id: i64 = res.get(0);
	Ok(email_id as u64)
}

pub(crate) async fn update_job_id(
	conn: &mut SqliteConnection,
	email_id: EmailId,
	job_id: &str,
) -> ClResult<()> {
	let res = sqlx::query("UPDATE scheduled_emails SET job_id=?, updated_at=? WHERE email_id=?")
		.bind(job_id)
		.bind(Timestamp::now().0)
		.bind(email_id as i64)
		.execute(conn)
		.await
		.map_err(map_write_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn update(db: &SqlitePool, email_id: EmailId, patch: &EmailPatch) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE scheduled_emails SET ");
	let mut has_updates = false;

	has_updates = push_patch!(query, has_updates, "status", &patch.status, |v| v.as_str());
	has_updates = push_patch!(query, has_updates, "scheduled_time", &patch.scheduled_time, |v| v.0);
	has_updates = push_patch!(query, has_updates, "sent_at", &patch.sent_at, |v| v.0);
	has_updates =
		push_patch!(query, has_updates, "error_message", &patch.error_message, |v| v.to_string());
	has_updates = push_patch!(query, has_updates, "job_id", &patch.job_id, |v| v.to_string());

	if !has_updates {
		return Ok(());
	}

	query.push(", updated_at=").push_bind(Timestamp::now().0);
	query.push(" WHERE email_id=").push_bind(email_id as i64);

	let res = query.build().execute(db).await.map_err(map_write_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn record_failure(db: &SqlitePool, email_id: EmailId, error: &str) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE scheduled_emails SET status='failed', error_message=?, attempts=attempts+1,
		updated_at=? WHERE email_id=?",
	)
	.bind(error)
	.bind(Timestamp::now().0)
	.bind(email_id as i64)
	.execute(db)
	.await
	.map_err(map_write_err)?;

	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

pub(crate) async fn stats(db: &SqlitePool, user_id: UserId) -> ClResult<EmailStats> {
	let res = sqlx::query(
		"SELECT COUNT(*) AS total,
		COALESCE(SUM(status='sent'), 0) AS sent,
		COALESCE(SUM(status='failed'), 0) AS failed,
		COALESCE(SUM(status='scheduled'), 0) AS scheduled,
		COALESCE(SUM(status='queued'), 0) AS queued
		FROM scheduled_emails WHERE user_id=?",
	)
	.bind(user_id.0 as i64)
	.fetch_one(db)
	.await;

	map_res(res, |row| {
		Ok(EmailStats {
			total: get_u64(&row, "total")?,
			sent: get_u64(&row, "sent")?,
			failed: get_u64(&row, "failed")?,
			scheduled: get_u64(&row, "scheduled")?,
			queued: get_u64(&row, "queued")?,
		})
	})
}

// vim: ts=4
