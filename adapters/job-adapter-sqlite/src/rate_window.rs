//! Durable hourly send counters

use sqlx::{Row, SqlitePool};

use cadence::job_adapter::RateWindow;
use cadence::prelude::*;

use crate::utils::*;

/// Insert-or-increment in one statement, returns the new count
pub(crate) async fn increment(
	db: &SqlitePool,
	user_id: UserId,
	window_start: Timestamp,
) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO rate_limit_tracking (user_id, window_start, email_count, updated_at)
		VALUES (?1, ?2, 1, ?3)
		ON CONFLICT(user_id, window_start)
		DO UPDATE SET email_count=email_count+1, updated_at=excluded.updated_at
		RETURNING email_count",
	)
	.bind(user_id.0 as i64)
	.bind(window_start.0)
	.bind(Timestamp::now().0)
	.fetch_one(db)
	.await;

	map_res(res, |row| get_u64(&row, "email_count"))
}

pub(crate) async fn read(db: &SqlitePool, user_id: UserId, window_start: Timestamp) -> ClResult<u64> {
	let res = sqlx::query(
		"SELECT email_count FROM rate_limit_tracking WHERE user_id=? AND window_start=?",
	)
	.bind(user_id.0 as i64)
	.bind(window_start.0)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	match res {
		Some(row) => get_u64(&row, "email_count").inspect_err(inspect).map_err(|_| Error::DbError),
		None => Ok(0),
	}
}

pub(crate) async fn list(db: &SqlitePool, window_start: Timestamp) -> ClResult<Vec<RateWindow>> {
	let res = sqlx::query(
		"SELECT user_id, window_start, email_count FROM rate_limit_tracking
		WHERE window_start=? ORDER BY user_id",
	)
	.bind(window_start.0)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	collect_res(res.iter().map(|row| {
		Ok(RateWindow {
			user_id: UserId(get_u64(row, "user_id")?),
			window_start: row.try_get("window_start").map(Timestamp)?,
			count: get_u64(row, "email_count")?,
		})
	}))
}

// vim: ts=4
