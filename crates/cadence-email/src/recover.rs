//! Restart recovery of the delay queue from the job store.
//!
//! The queue lives in memory, so after a restart it is rebuilt from the email rows:
//! `scheduled` rows are queued again under their job id, `queued` rows were in flight when
//! the process stopped and are failed, since it is unknown whether the relay accepted them.

use crate::prelude::*;
use crate::task::{email_job_id, schedule_email, EmailDispatchTask};
use cadence_types::job_adapter::{
	EmailOrder, EmailPatch, EmailStatus, ListEmailOptions, ScheduledEmail,
};

pub const INTERRUPTED_MESSAGE: &str = "interrupted: delivery outcome unknown";

/// Fail an email left `queued`. It counts towards the campaign's failed emails unless
/// an earlier failed attempt already did.
pub(crate) async fn fail_interrupted(app: &App, email: &ScheduledEmail) -> ClResult<()> {
	app.job_adapter.record_email_failure(email.email_id, INTERRUPTED_MESSAGE).await?;
	if email.attempts == 0 {
		app.job_adapter.adjust_campaign_counts(email.campaign_id, 0, 1).await?;
	}
	Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
	pub rescheduled: usize,
	pub interrupted: usize,
}

pub async fn recover_pending(app: &App) -> ClResult<RecoveryReport> {
	let emails = app
		.job_adapter
		.list_emails(&ListEmailOptions {
			status: Some([EmailStatus::Scheduled, EmailStatus::Queued].into()),
			order: EmailOrder::Id,
			..Default::default()
		})
		.await?;

	let mut report = RecoveryReport::default();
	for email in &emails {
		match email.status {
			EmailStatus::Scheduled => {
				if email.job_id.is_none() {
					let patch = EmailPatch {
						job_id: Patch::Value(email_job_id(email.email_id).into()),
						..Default::default()
					};
					app.job_adapter.update_email(email.email_id, &patch).await?;
				}
				schedule_email(app, EmailDispatchTask::from(email), email.scheduled_time)?;
				report.rescheduled += 1;
			}
			EmailStatus::Queued => {
				warn!("Email {} was in flight at shutdown, marking failed", email.email_id);
				fail_interrupted(app, email).await?;
				report.interrupted += 1;
			}
			EmailStatus::Sent | EmailStatus::Failed => {}
		}
	}

	info!(
		"Recovered {} scheduled emails, {} interrupted",
		report.rescheduled, report.interrupted
	);
	Ok(report)
}

// vim: ts=4
