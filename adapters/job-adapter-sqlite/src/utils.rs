//! Shared utilities for the SQLite job store
//!
//! Error mapping, row decoding helpers and the patch macro used by the domain modules.

use sqlx::sqlite::SqliteRow;

use cadence::prelude::*;

/// Applies a `Patch` field to an UPDATE query.
/// Returns true if the field was added (for tracking has_updates)
macro_rules! push_patch {
	($query:expr, $has_updates:expr, $field:literal, $patch:expr, |$v:ident| $convert:expr) => {{
		match $patch {
			Patch::Undefined => $has_updates,
			Patch::Null => {
				if $has_updates {
					$query.push(", ");
				}
				$query.push(concat!($field, "=NULL"));
				true
			}
			Patch::Value($v) => {
				if $has_updates {
					$query.push(", ");
				}
				$query.push(concat!($field, "=")).push_bind($convert);
				true
			}
		}
	}};
}

pub(crate) use push_patch;

/// Log database error for debugging
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Translate a write error, keeping uniqueness violations apart
pub(crate) fn map_write_err(err: sqlx::Error) -> Error {
	inspect(&err);
	match &err {
		sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
			Error::Conflict(db_err.message().to_string())
		}
		_ => Error::DbError,
	}
}

/// Map a single-row query result, translating SQL errors to ClResult
pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> ClResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

/// Collect an iterator of query results, translating errors
pub(crate) fn collect_res<T>(
	iter: impl Iterator<Item = Result<T, sqlx::Error>> + Unpin,
) -> ClResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.inspect_err(inspect).map_err(|_| Error::DbError)?);
	}
	Ok(items)
}

/// Parse a stored enum value, reporting failures as decode errors
pub(crate) fn parse_col<T>(value: &str) -> Result<T, sqlx::Error>
where
	T: std::str::FromStr<Err = Error>,
{
	value.parse().map_err(|err: Error| sqlx::Error::Decode(Box::new(err)))
}

/// Unsigned integer column (SQLite stores all integers as i64)
pub(crate) fn get_u64(row: &SqliteRow, col: &str) -> Result<u64, sqlx::Error> {
	use sqlx::Row;
	let value: i64 = row.try_get(col)?;
	u64::try_from(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn get_u32(row: &SqliteRow, col: &str) -> Result<u32, sqlx::Error> {
	use sqlx::Row;
	let value: i64 = row.try_get(col)?;
	u32::try_from(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

// vim: ts=4
