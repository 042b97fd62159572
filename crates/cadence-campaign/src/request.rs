//! Campaign creation request and its validation

use lettre::Address;
use serde::Deserialize;
use std::collections::HashSet;

use crate::prelude::*;

/// Request body for creating a campaign
#[derive(Clone, Debug, Deserialize)]
pub struct CreateCampaign {
	pub subject: String,
	pub body: String,
	/// Recipients in send order
	pub recipients: Vec<String>,
	pub start_time: Timestamp,
	#[serde(rename = "delay_between_emails_ms")]
	pub delay_between_emails: u64,
	pub hourly_limit: u32,
}

impl CreateCampaign {
	/// Checks the request and returns the trimmed recipient list.
	/// Duplicates are detected case-insensitively.
	pub fn validate(&self) -> ClResult<Vec<&str>> {
		if self.recipients.is_empty() {
			return Err(Error::ValidationError("No recipients provided".into()));
		}
		if self.subject.trim().is_empty() {
			return Err(Error::ValidationError("Subject is required".into()));
		}
		if self.body.trim().is_empty() {
			return Err(Error::ValidationError("Body is required".into()));
		}
		if self.hourly_limit == 0 {
			return Err(Error::ValidationError("Hourly limit must be at least 1".into()));
		}
		if u32::try_from(self.recipients.len()).is_err() {
			return Err(Error::ValidationError("Too many recipients".into()));
		}

		let mut seen = HashSet::with_capacity(self.recipients.len());
		let mut recipients = Vec::with_capacity(self.recipients.len());
		for recipient in &self.recipients {
			let recipient = recipient.trim();
			if recipient.parse::<Address>().is_err() {
				return Err(Error::ValidationError(format!("Invalid recipient email: {}", recipient)));
			}
			if !seen.insert(recipient.to_lowercase()) {
				return Err(Error::ValidationError(format!("Duplicate recipient: {}", recipient)));
			}
			recipients.push(recipient);
		}

		self.send_time(recipients.len() - 1).ok_or_else(|| {
			Error::ValidationError("Schedule exceeds the supported time range".into())
		})?;
		Ok(recipients)
	}

	/// Send time of the recipient at `index`: `start_time + index * delay`
	pub fn send_time(&self, index: usize) -> Option<Timestamp> {
		let offset = i64::try_from(self.delay_between_emails)
			.ok()?
			.checked_mul(i64::try_from(index).ok()?)?;
		self.start_time.0.checked_add(offset).map(Timestamp)
	}
}


// vim: ts=4
