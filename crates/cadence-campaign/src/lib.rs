//! Campaign scheduling
//!
//! Turns a campaign request into one time-scheduled email per recipient, persisted in a
//! single store transaction and queued for dispatch, plus the owner-scoped read API.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod query;
pub mod request;
pub mod schedule;

pub use query::{
	delete_campaign, get_campaign, get_campaign_stats, list_campaign_emails, list_campaigns,
	list_scheduled_emails, list_sent_or_failed_emails,
};
pub use request::CreateCampaign;
pub use schedule::{create_campaign, CreatedCampaign};

mod prelude;

// vim: ts=4
