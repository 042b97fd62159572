//! Owner-scoped campaign and email queries

use crate::prelude::*;
use cadence_email::email_job_id;
use cadence_types::job_adapter::{
	Campaign, EmailOrder, EmailStats, EmailStatus, ListEmailOptions, ScheduledEmail,
};

/// Campaigns of a user, newest first
pub async fn list_campaigns(app: &App, user_id: UserId) -> ClResult<Vec<Campaign>> {
	app.job_adapter.list_campaigns(user_id).await
}

/// A campaign owned by `user_id`. Campaigns of other users are reported as not found.
pub async fn get_campaign(app: &App, campaign_id: CampaignId, user_id: UserId) -> ClResult<Campaign> {
	let campaign = app.job_adapter.read_campaign(campaign_id).await?;
	if campaign.user_id != user_id {
		debug!("Campaign {} is not owned by user {}", campaign_id, user_id);
		return Err(Error::NotFound);
	}
	Ok(campaign)
}

/// Emails still waiting for dispatch, soonest first
pub async fn list_scheduled_emails(app: &App, user_id: UserId) -> ClResult<Vec<ScheduledEmail>> {
	app.job_adapter
		.list_emails(&ListEmailOptions {
			user_id: Some(user_id),
			status: Some([EmailStatus::Scheduled, EmailStatus::Queued].into()),
			order: EmailOrder::ScheduledTime,
			..Default::default()
		})
		.await
}

/// Emails with a final outcome, most recent first
pub async fn list_sent_or_failed_emails(
	app: &App,
	user_id: UserId,
) -> ClResult<Vec<ScheduledEmail>> {
	app.job_adapter
		.list_emails(&ListEmailOptions {
			user_id: Some(user_id),
			status: Some([EmailStatus::Sent, EmailStatus::Failed].into()),
			order: EmailOrder::RecentlySent,
			..Default::default()
		})
		.await
}

pub async fn get_campaign_stats(app: &App, user_id: UserId) -> ClResult<EmailStats> {
	app.job_adapter.email_stats(user_id).await
}

/// All emails of one campaign in recipient order
pub async fn list_campaign_emails(
	app: &App,
	campaign_id: CampaignId,
	user_id: UserId,
) -> ClResult<Vec<ScheduledEmail>> {
	get_campaign(app, campaign_id, user_id).await?;
	app.job_adapter
		.list_emails(&ListEmailOptions {
			campaign_id: Some(campaign_id),
			order: EmailOrder::Id,
			..Default::default()
		})
		.await
}

/// Delete a campaign with its emails and drop their pending dispatch jobs.
/// Jobs already handed to a worker find no row and end as not found.
pub async fn delete_campaign(app: &App, campaign_id: CampaignId, user_id: UserId) -> ClResult<()> {
	let emails = list_campaign_emails(app, campaign_id, user_id).await?;
	app.job_adapter.delete_campaign(campaign_id).await?;

	let mut cancelled = 0;
	for email in &emails {
		if app.queue.cancel(&email_job_id(email.email_id))? {
			cancelled += 1;
		}
	}
	info!(
		campaign_id = campaign_id,
		user_id = %user_id,
		cancelled = cancelled,
		"Campaign deleted"
	);
	Ok(())
}

// vim: ts=4
