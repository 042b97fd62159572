//! Common types used throughout the Cadence scheduler.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub type CampaignId = u64;
pub type EmailId = u64;

/// Milliseconds in one rate-limit window
pub const HOUR_MS: i64 = 3_600_000;

// UserId //
//********//
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

// Timestamp //
//***********//
/// Milliseconds since the Unix epoch (UTC)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(i64::try_from(res.as_millis()).unwrap_or(i64::MAX))
	}

	pub fn from_now(millis: i64) -> Timestamp {
		Self::now().add_millis(millis)
	}

	pub fn add_millis(self, millis: i64) -> Timestamp {
		Timestamp(self.0.saturating_add(millis))
	}

	/// Start of the clock hour containing this instant
	pub fn hour_floor(self) -> Timestamp {
		Timestamp(self.0 - self.0.rem_euclid(HOUR_MS))
	}

	/// Start of the first clock hour strictly after this instant
	pub fn next_hour(self) -> Timestamp {
		self.hour_floor().add_millis(HOUR_MS)
	}

	/// Milliseconds from now until this instant (zero if already past)
	pub fn millis_from_now(self) -> u64 {
		u64::try_from(self.0 - Self::now().0).unwrap_or_default()
	}

	pub fn to_datetime(self) -> DateTime<Utc> {
		DateTime::<Utc>::from_timestamp_millis(self.0).unwrap_or_default()
	}

	/// RFC 3339 representation, millisecond precision (e.g. `2024-01-15T10:00:00.000Z`)
	pub fn to_rfc3339(self) -> String {
		self.to_datetime().to_rfc3339_opts(SecondsFormat::Millis, true)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.to_rfc3339())
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Patch //
//*******//
/// Partial update of a single field
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}


// vim: ts=4
