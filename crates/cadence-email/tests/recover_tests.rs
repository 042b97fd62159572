//! Restart recovery of scheduled and in-flight emails

mod common;

use std::sync::Arc;

use cadence_email::recover::INTERRUPTED_MESSAGE;
use cadence_email::{email_job_id, recover_pending, RecoveryReport};
use cadence_types::job_adapter::*;
use cadence_types::prelude::*;
use common::*;

#[tokio::test]
async fn test_recover_pending() {
	let transport = Arc::new(FakeTransport::default());
	let (app, _tmp) = create_app(test_opts(), transport).await;
	let start = Timestamp::from_now(60_000);
	let (campaign_id, emails) = seed_campaign(
		&app,
		UserId(1),
		&["alice@example.com", "bob@example.com", "carol@example.com"],
		start,
		2000,
		100,
	)
	.await;

	// bob was handed to the relay when the process stopped, carol already went out
	app.job_adapter
		.update_email(
			emails[1].email_id,
			&EmailPatch { status: Patch::Value(EmailStatus::Queued), ..Default::default() },
		)
		.await
		.unwrap();
	app.job_adapter
		.update_email(
			emails[2].email_id,
			&EmailPatch {
				status: Patch::Value(EmailStatus::Sent),
				sent_at: Patch::Value(Timestamp::now()),
				..Default::default()
			},
		)
		.await
		.unwrap();
	app.job_adapter.adjust_campaign_counts(campaign_id, 1, 0).await.unwrap();

	let report = recover_pending(&app).await.unwrap();
	assert_eq!(report, RecoveryReport { rescheduled: 1, interrupted: 1 });

	let alice_job = email_job_id(emails[0].email_id);
	assert_eq!(app.queue.scheduled_at(&alice_job).unwrap(), Some(start));
	assert_eq!(app.queue.health().unwrap().pending, 1);

	let bob = app.job_adapter.read_email(emails[1].email_id).await.unwrap();
	assert_eq!(bob.status, EmailStatus::Failed);
	assert_eq!(bob.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
	assert_eq!(bob.attempts, 1);

	let campaign = app.job_adapter.read_campaign(campaign_id).await.unwrap();
	assert_eq!((campaign.sent_count, campaign.failed_count), (1, 1));
	assert_eq!(campaign.status, CampaignStatus::InProgress);
}

#[tokio::test]
async fn test_recover_is_idempotent_for_scheduled() {
	let transport = Arc::new(FakeTransport::default());
	let (app, _tmp) = create_app(test_opts(), transport).await;
	seed_campaign(&app, UserId(1), &["alice@example.com"], Timestamp::from_now(60_000), 0, 100)
		.await;

	recover_pending(&app).await.unwrap();
	recover_pending(&app).await.unwrap();
	assert_eq!(app.queue.health().unwrap().pending, 1);
}
