//! Outbound mail transport trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

/// Email message to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
	pub to: String,
	pub subject: String,
	pub text_body: String,
	pub html_body: Option<String>,
}

impl EmailMessage {
	/// Plain-text message with an HTML alternative where newlines become `<br>`
	pub fn with_html_alternative(to: &str, subject: &str, body: &str) -> Self {
		Self {
			to: to.to_string(),
			subject: subject.to_string(),
			text_body: body.to_string(),
			html_body: Some(body.replace('\n', "<br>")),
		}
	}
}

/// Send-or-fail primitive. An `Ok` means the relay accepted the message.
#[async_trait]
pub trait MailTransport: Debug + Send + Sync {
	async fn send(&self, message: &EmailMessage) -> ClResult<()>;
}


// vim: ts=4
