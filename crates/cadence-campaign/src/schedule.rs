//! Campaign materialization
//!
//! The campaign row, one email row per recipient and their job ids are written in one
//! transaction. Dispatch jobs are queued only after the commit, so a worker can never pick
//! up an email whose row is not visible yet.

use serde::Serialize;

use crate::prelude::*;
use crate::request::CreateCampaign;
use cadence_email::{email_job_id, schedule_email, EmailDispatchTask};
use cadence_types::job_adapter::{
	Campaign, CampaignStatus, JobTransaction, NewCampaign, NewEmail, ScheduledEmail,
};

/// A persisted campaign with its scheduled emails in recipient order
#[derive(Clone, Debug, Serialize)]
pub struct CreatedCampaign {
	pub campaign: Campaign,
	pub emails: Vec<ScheduledEmail>,
}

struct PendingEmail<'a> {
	email_id: EmailId,
	recipient: &'a str,
	scheduled_time: Timestamp,
}

pub async fn create_campaign(
	app: &App,
	user_id: UserId,
	req: &CreateCampaign,
) -> ClResult<CreatedCampaign> {
	let recipients = req.validate()?;

	let mut tx = app.job_adapter.begin().await?;
	let pending = match insert_campaign(&mut *tx, user_id, req, &recipients).await {
		Ok(pending) => pending,
		Err(err) => {
			warn!(error = %err, user_id = %user_id, "Campaign creation failed, rolling back");
			if let Err(rb_err) = tx.rollback().await {
				error!("Rollback failed: {}", rb_err);
			}
			return Err(err);
		}
	};
	tx.commit().await?;
	let (campaign_id, pending) = pending;

	for email in &pending {
		let task = EmailDispatchTask::new(email.email_id, campaign_id, user_id, email.recipient);
		if let Err(err) = schedule_email(app, task, email.scheduled_time) {
			// The row stays scheduled and is queued again by restart recovery
			error!(error = %err, email_id = email.email_id, "Failed to queue email");
		}
	}

	info!(
		campaign_id = campaign_id,
		user_id = %user_id,
		emails = pending.len(),
		"Campaign created"
	);

	let campaign = app.job_adapter.read_campaign(campaign_id).await?;
	let mut emails = Vec::with_capacity(pending.len());
	for email in &pending {
		emails.push(app.job_adapter.read_email(email.email_id).await?);
	}
	Ok(CreatedCampaign { campaign, emails })
}

async fn insert_campaign<'a>(
	tx: &mut dyn JobTransaction,
	user_id: UserId,
	req: &CreateCampaign,
	recipients: &[&'a str],
) -> ClResult<(CampaignId, Vec<PendingEmail<'a>>)> {
	let total_emails = u32::try_from(recipients.len())
		.map_err(|_| Error::ValidationError("Too many recipients".into()))?;

	let campaign_id = tx
		.insert_campaign(&NewCampaign {
			user_id,
			subject: &req.subject,
			body: &req.body,
			start_time: req.start_time,
			delay_between_emails: req.delay_between_emails,
			hourly_limit: req.hourly_limit,
			total_emails,
		})
		.await?;

	let mut pending = Vec::with_capacity(recipients.len());
	for (i, &recipient) in recipients.iter().enumerate() {
		let scheduled_time = req.send_time(i).ok_or_else(|| {
			Error::ValidationError("Schedule exceeds the supported time range".into())
		})?;
		let email_id = tx
			.insert_email(&NewEmail {
				campaign_id,
				user_id,
				recipient,
				subject: &req.subject,
				body: &req.body,
				scheduled_time,
			})
			.await?;
		tx.update_email_job_id(email_id, &email_job_id(email_id)).await?;
		pending.push(PendingEmail { email_id, recipient, scheduled_time });
	}

	tx.update_campaign_status(campaign_id, CampaignStatus::InProgress).await?;
	Ok((campaign_id, pending))
}

// vim: ts=4
