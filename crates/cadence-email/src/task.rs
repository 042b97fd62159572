//! Email dispatch task
//!
//! One job per scheduled email, identified by `email-{id}` for the lifetime of the email.
//! A delivery takes the per-email processing lock, checks the owner's hourly quota,
//! sends, and records the outcome on the email row and its campaign. Quota denials put
//! the job back at the next free window instead of failing it.
//!
//! An email is handed to the transport at most once. A row found `queued` by a later
//! delivery may already have been accepted by the relay, so it is failed instead of sent.
//! Once the transport accepted a message, store errors are logged and never retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::prelude::*;
use crate::recover::fail_interrupted;
use cadence_core::scheduler::{JobId, Task, TaskOutcome};
use cadence_types::job_adapter::{Campaign, EmailPatch, EmailStatus, ScheduledEmail};
use cadence_types::mail_transport::EmailMessage;

/// Delay queue identity of an email
pub fn email_job_id(email_id: EmailId) -> String {
	format!("email-{}", email_id)
}

fn processing_lock_key(email_id: EmailId) -> String {
	format!("processing:email:{}", email_id)
}

/// Result of one delivery of a dispatch job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
	Sent,
	/// Another worker holds the processing lock
	AlreadyProcessing,
	/// The email or its campaign no longer exists
	NotFound,
	AlreadySent,
	/// Left `queued` by an earlier delivery with unknown outcome, failed without sending
	Interrupted,
	/// Owner over quota, moved to the given time
	Rescheduled(Timestamp),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailDispatchTask {
	pub email_id: EmailId,
	pub campaign_id: CampaignId,
	pub user_id: UserId,
	pub recipient: String,
}

impl EmailDispatchTask {
	pub fn new(
		email_id: EmailId,
		campaign_id: CampaignId,
		user_id: UserId,
		recipient: impl Into<String>,
	) -> Self {
		Self { email_id, campaign_id, user_id, recipient: recipient.into() }
	}

	pub async fn dispatch(&self, app: &App) -> ClResult<DispatchOutcome> {
		let lock_key = processing_lock_key(self.email_id);
		let acquired = app
			.cache_adapter
			.acquire(&lock_key, app.opts.processing_lock_ttl)
			.await
			.map_err(|err| {
				error!("Processing lock for email {} unavailable: {}", self.email_id, err);
				Error::ServiceUnavailable(format!("processing lock unavailable: {}", err))
			})?;
		let Some(token) = acquired else {
			info!("Email {} is already being processed", self.email_id);
			return Ok(DispatchOutcome::AlreadyProcessing);
		};

		let res = self.dispatch_locked(app).await;

		if let Err(err) = app.cache_adapter.release(&lock_key, token).await {
			warn!("Failed to release processing lock of email {}: {}", self.email_id, err);
		}
		res
	}

	async fn dispatch_locked(&self, app: &App) -> ClResult<DispatchOutcome> {
		let Some((email, campaign)) = self.load(app).await? else {
			warn!("Email {} ({}) not found, dropping job", self.email_id, self.recipient);
			return Ok(DispatchOutcome::NotFound);
		};
		match email.status {
			EmailStatus::Sent => {
				info!("Email {} already sent, skipping", email.email_id);
				return Ok(DispatchOutcome::AlreadySent);
			}
			EmailStatus::Queued => {
				warn!("Email {} was left in flight by an earlier delivery, marking failed", email.email_id);
				fail_interrupted(app, &email).await?;
				return Ok(DispatchOutcome::Interrupted);
			}
			EmailStatus::Scheduled | EmailStatus::Failed => {}
		}

		let limit = campaign.hourly_limit.min(app.opts.max_emails_per_hour);
		if !app.rate_tracker.check_allowed(email.user_id, limit).await {
			return self.reschedule(app, &email, limit).await;
		}

		// Failed attempts are already part of the campaign's failed count
		let counted_as_failed = email.attempts > 0;

		tokio::time::sleep(app.opts.min_delay_between_emails).await;
		app.job_adapter
			.update_email(
				email.email_id,
				&EmailPatch { status: Patch::Value(EmailStatus::Queued), ..Default::default() },
			)
			.await?;

		let message = EmailMessage::with_html_alternative(&email.recipient, &email.subject, &email.body);
		match app.transport.send(&message).await {
			Ok(()) => {
				info!("Email {} sent to {}", email.email_id, email.recipient);
				self.record_sent(app, &email, counted_as_failed).await;
				Ok(DispatchOutcome::Sent)
			}
			Err(err) => {
				warn!("Email {} to {} failed: {}", email.email_id, email.recipient, err);
				app.job_adapter.record_email_failure(email.email_id, &err.to_string()).await?;
				if !counted_as_failed {
					app.job_adapter.adjust_campaign_counts(email.campaign_id, 0, 1).await?;
				}
				Err(err)
			}
		}
	}

	/// Store the outcome of an accepted message. Errors are only logged: returning one
	/// would let the queue retry a message the relay already has.
	async fn record_sent(&self, app: &App, email: &ScheduledEmail, counted_as_failed: bool) {
		if let Err(err) = app.rate_tracker.increment(email.user_id).await {
			error!("Failed to count email {} against user {}: {}", email.email_id, email.user_id, err);
		}

		let patch = EmailPatch {
			status: Patch::Value(EmailStatus::Sent),
			sent_at: Patch::Value(Timestamp::now()),
			error_message: Patch::Null,
			..Default::default()
		};
		if let Err(err) = app.job_adapter.update_email(email.email_id, &patch).await {
			// The row stays queued until restart recovery fails it as interrupted
			error!("Email {} was sent but could not be marked sent: {}", email.email_id, err);
			return;
		}

		let failed_delta = if counted_as_failed { -1 } else { 0 };
		if let Err(err) = app.job_adapter.adjust_campaign_counts(email.campaign_id, 1, failed_delta).await
		{
			error!("Failed to count sent email {} on campaign {}: {}", email.email_id, email.campaign_id, err);
		}
	}

	/// Email row and its campaign, `None` if either is gone
	async fn load(&self, app: &App) -> ClResult<Option<(ScheduledEmail, Campaign)>> {
		let email = match app.job_adapter.read_email(self.email_id).await {
			Ok(email) => email,
			Err(Error::NotFound) => return Ok(None),
			Err(err) => return Err(err),
		};
		match app.job_adapter.read_campaign(email.campaign_id).await {
			Ok(campaign) => Ok(Some((email, campaign))),
			Err(Error::NotFound) => Ok(None),
			Err(err) => Err(err),
		}
	}

	async fn reschedule(
		&self,
		app: &App,
		email: &ScheduledEmail,
		limit: u32,
	) -> ClResult<DispatchOutcome> {
		let mut slot = app.rate_tracker.next_available_slot(email.user_id, limit).await;
		if slot <= email.scheduled_time {
			slot = Timestamp::now().next_hour();
		}

		app.job_adapter
			.update_email(
				email.email_id,
				&EmailPatch {
					status: Patch::Value(EmailStatus::Scheduled),
					scheduled_time: Patch::Value(slot),
					..Default::default()
				},
			)
			.await?;
		warn!(
			"User {} over hourly limit ({}), email {} rescheduled to {}",
			email.user_id, limit, email.email_id, slot
		);
		Ok(DispatchOutcome::Rescheduled(slot))
	}
}

impl From<&ScheduledEmail> for EmailDispatchTask {
	fn from(email: &ScheduledEmail) -> Self {
		Self::new(email.email_id, email.campaign_id, email.user_id, &*email.recipient)
	}
}

#[async_trait]
impl Task<App> for EmailDispatchTask {
	fn kind() -> &'static str {
		"email.dispatch"
	}

	fn kind_of(&self) -> &'static str {
		Self::kind()
	}

	async fn run(&self, app: &App) -> ClResult<TaskOutcome> {
		match self.dispatch(app).await? {
			DispatchOutcome::Rescheduled(at) => Ok(TaskOutcome::RetryAt(at)),
			_ => Ok(TaskOutcome::Done),
		}
	}
}

/// Queue the dispatch job of an email under its stable job id, with the app's retry policy
pub fn schedule_email(app: &App, task: EmailDispatchTask, at: Timestamp) -> ClResult<JobId> {
	let job_id = email_job_id(task.email_id);
	app.queue.job(job_id, Arc::new(task)).with_retry(app.opts.retry.clone()).at(at)
}


// vim: ts=4
