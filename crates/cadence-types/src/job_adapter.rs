//! Durable Job Store adapter trait and record types.
//!
//! The job store holds campaigns, their scheduled emails and the durable copy of the
//! per-user hourly send counters. It is the source of truth whenever the in-memory
//! delay queue loses its state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

// Status enums
//**************
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
	Pending,
	InProgress,
	Completed,
	Failed,
}

impl CampaignStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			CampaignStatus::Pending => "pending",
			CampaignStatus::InProgress => "in_progress",
			CampaignStatus::Completed => "completed",
			CampaignStatus::Failed => "failed",
		}
	}
}

impl std::str::FromStr for CampaignStatus {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"pending" => Ok(CampaignStatus::Pending),
			"in_progress" => Ok(CampaignStatus::InProgress),
			"completed" => Ok(CampaignStatus::Completed),
			"failed" => Ok(CampaignStatus::Failed),
			_ => Err(Error::Internal(format!("unknown campaign status: {}", s))),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
	Scheduled,
	Queued,
	Sent,
	Failed,
}

impl EmailStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			EmailStatus::Scheduled => "scheduled",
			EmailStatus::Queued => "queued",
			EmailStatus::Sent => "sent",
			EmailStatus::Failed => "failed",
		}
	}
}

impl std::str::FromStr for EmailStatus {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"scheduled" => Ok(EmailStatus::Scheduled),
			"queued" => Ok(EmailStatus::Queued),
			"sent" => Ok(EmailStatus::Sent),
			"failed" => Ok(EmailStatus::Failed),
			_ => Err(Error::Internal(format!("unknown email status: {}", s))),
		}
	}
}

// Records
//*********
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
	#[serde(rename = "id")]
	pub campaign_id: CampaignId,
	pub user_id: UserId,
	pub subject: Box<str>,
	pub body: Box<str>,
	pub start_time: Timestamp,
	/// Milliseconds between two consecutive sends
	pub delay_between_emails: u64,
	pub hourly_limit: u32,
	pub total_emails: u32,
	pub sent_count: u32,
	pub failed_count: u32,
	pub status: CampaignStatus,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEmail {
	#[serde(rename = "id")]
	pub email_id: EmailId,
	pub campaign_id: CampaignId,
	pub user_id: UserId,
	pub recipient: Box<str>,
	pub subject: Box<str>,
	pub body: Box<str>,
	pub scheduled_time: Timestamp,
	pub status: EmailStatus,
	pub job_id: Option<Box<str>>,
	pub sent_at: Option<Timestamp>,
	pub error_message: Option<Box<str>>,
	pub attempts: u32,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct NewCampaign<'a> {
	pub user_id: UserId,
	pub subject: &'a str,
	pub body: &'a str,
	pub start_time: Timestamp,
	pub delay_between_emails: u64,
	pub hourly_limit: u32,
	pub total_emails: u32,
}

#[derive(Debug)]
pub struct NewEmail<'a> {
	pub campaign_id: CampaignId,
	pub user_id: UserId,
	pub recipient: &'a str,
	pub subject: &'a str,
	pub body: &'a str,
	pub scheduled_time: Timestamp,
}

#[derive(Debug, Default)]
pub struct EmailPatch {
	pub status: Patch<EmailStatus>,
	pub scheduled_time: Patch<Timestamp>,
	pub sent_at: Patch<Timestamp>,
	pub error_message: Patch<Box<str>>,
	pub job_id: Patch<Box<str>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmailOrder {
	/// Earliest `scheduled_time` first
	#[default]
	ScheduledTime,
	/// Most recent `sent_at` first, then most recently updated
	RecentlySent,
	/// Insertion order
	Id,
}

#[derive(Debug, Default)]
pub struct ListEmailOptions {
	pub user_id: Option<UserId>,
	pub campaign_id: Option<CampaignId>,
	pub status: Option<Box<[EmailStatus]>>,
	pub order: EmailOrder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EmailStats {
	pub total: u64,
	pub sent: u64,
	pub failed: u64,
	pub scheduled: u64,
	pub queued: u64,
}

/// Durable row of the hourly send counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateWindow {
	pub user_id: UserId,
	pub window_start: Timestamp,
	pub count: u64,
}

// Adapter traits
//****************
/// Explicit multi-row transaction. Dropping an uncommitted transaction rolls it back.
#[async_trait]
pub trait JobTransaction: Send {
	async fn insert_campaign(&mut self, campaign: &NewCampaign<'_>) -> ClResult<CampaignId>;
	/// Fails with `Error::Conflict` if the recipient already exists in the campaign
	/// (case-insensitive).
	async fn insert_email(&mut self, email: &NewEmail<'_>) -> ClResult<EmailId>;
	async fn update_email_job_id(&mut self, email_id: EmailId, job_id: &str) -> ClResult<()>;
	async fn update_campaign_status(
		&mut self,
		campaign_id: CampaignId,
		status: CampaignStatus,
	) -> ClResult<()>;

	async fn commit(self: Box<Self>) -> ClResult<()>;
	async fn rollback(self: Box<Self>) -> ClResult<()>;
}

#[async_trait]
pub trait JobAdapter: Debug + Send + Sync {
	async fn begin(&self) -> ClResult<Box<dyn JobTransaction>>;

	// Campaigns
	//***********
	async fn read_campaign(&self, campaign_id: CampaignId) -> ClResult<Campaign>;
	/// Campaigns of a user, newest first
	async fn list_campaigns(&self, user_id: UserId) -> ClResult<Vec<Campaign>>;
	/// Applies count deltas and recomputes the campaign status: once every email has an
	/// outcome it becomes `completed` (at least one sent) or `failed` (none sent).
	async fn adjust_campaign_counts(
		&self,
		campaign_id: CampaignId,
		sent_delta: i64,
		failed_delta: i64,
	) -> ClResult<()>;
	/// Deletes the campaign together with its emails
	async fn delete_campaign(&self, campaign_id: CampaignId) -> ClResult<()>;

	// Scheduled emails
	//******************
	async fn read_email(&self, email_id: EmailId) -> ClResult<ScheduledEmail>;
	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>>;
	async fn update_email(&self, email_id: EmailId, patch: &EmailPatch) -> ClResult<()>;
	/// Marks the email `failed`, stores the error and increments `attempts`
	async fn record_email_failure(&self, email_id: EmailId, error: &str) -> ClResult<()>;
	async fn email_stats(&self, user_id: UserId) -> ClResult<EmailStats>;

	// Rate windows
	//**************
	/// Atomic insert-or-increment, returns the new count
	async fn increment_rate_window(&self, user_id: UserId, window_start: Timestamp)
	-> ClResult<u64>;
	async fn read_rate_window(&self, user_id: UserId, window_start: Timestamp) -> ClResult<u64>;
	async fn list_rate_windows(&self, window_start: Timestamp) -> ClResult<Vec<RateWindow>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_round_trip_names() {
		for status in
			[EmailStatus::Scheduled, EmailStatus::Queued, EmailStatus::Sent, EmailStatus::Failed]
		{
			assert_eq!(status.as_str().parse::<EmailStatus>().ok(), Some(status));
		}
		assert_eq!("in_progress".parse::<CampaignStatus>().ok(), Some(CampaignStatus::InProgress));
		assert!("bogus".parse::<EmailStatus>().is_err());
	}
}

// vim: ts=4
