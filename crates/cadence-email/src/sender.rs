//! SMTP mail transport using lettre
//!
//! Builds one async transport at startup and reuses it for every send.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;
use std::time::Duration;

use crate::prelude::*;
use cadence_types::mail_transport::{EmailMessage, MailTransport};

/// Connection security towards the SMTP relay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsMode {
	None,
	#[default]
	StartTls,
	/// Implicit TLS (usually port 465)
	Tls,
}

impl TlsMode {
	pub fn as_str(self) -> &'static str {
		match self {
			TlsMode::None => "none",
			TlsMode::StartTls => "starttls",
			TlsMode::Tls => "tls",
		}
	}
}

impl FromStr for TlsMode {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"none" => Ok(TlsMode::None),
			"starttls" => Ok(TlsMode::StartTls),
			"tls" => Ok(TlsMode::Tls),
			_ => Err(Error::ConfigError(format!(
				"Invalid TLS mode: {}. Must be 'none', 'starttls', or 'tls'",
				s
			))),
		}
	}
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
	pub host: String,
	pub port: u16,
	pub username: Option<String>,
	pub password: Option<String>,
	pub from_address: String,
	pub from_name: String,
	pub tls_mode: TlsMode,
	pub timeout: Duration,
}

impl Default for SmtpConfig {
	fn default() -> Self {
		Self {
			host: "localhost".into(),
			port: 587,
			username: None,
			password: None,
			from_address: "noreply@localhost".into(),
			from_name: "Cadence".into(),
			tls_mode: TlsMode::StartTls,
			timeout: Duration::from_secs(30),
		}
	}
}

/// SMTP email sender
pub struct SmtpSender {
	mailer: AsyncSmtpTransport<Tokio1Executor>,
	from: Mailbox,
	host: String,
	port: u16,
}

impl std::fmt::Debug for SmtpSender {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SmtpSender")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("from", &self.from.to_string())
			.finish_non_exhaustive()
	}
}

impl SmtpSender {
	/// Create the transport. Does not connect; see [`SmtpSender::verify`].
	pub fn new(config: &SmtpConfig) -> ClResult<Self> {
		let address: Address = config
			.from_address
			.parse()
			.map_err(|_| Error::ConfigError(format!("Invalid from address: {}", config.from_address)))?;
		let from = Mailbox::new(Some(config.from_name.clone()), address);

		let tls = match config.tls_mode {
			TlsMode::Tls => Tls::Wrapper(tls_parameters(&config.host)?),
			TlsMode::StartTls => Tls::Required(tls_parameters(&config.host)?),
			TlsMode::None => Tls::None,
		};

		let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
			.port(config.port)
			.timeout(Some(config.timeout))
			.tls(tls);
		if let (Some(username), Some(password)) = (&config.username, &config.password) {
			builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
		}

		debug!(
			"SMTP transport for {}:{} with TLS mode: {}",
			config.host,
			config.port,
			config.tls_mode.as_str()
		);
		Ok(Self { mailer: builder.build(), from, host: config.host.clone(), port: config.port })
	}

	/// Startup connection check. Failures are only logged: sends will fail and be
	/// retried by the queue until the relay becomes reachable.
	pub async fn verify(&self) -> bool {
		match self.mailer.test_connection().await {
			Ok(true) => {
				info!("SMTP relay {}:{} reachable", self.host, self.port);
				true
			}
			Ok(false) => {
				warn!("SMTP relay {}:{} did not accept the connection", self.host, self.port);
				false
			}
			Err(e) => {
				warn!("SMTP relay {}:{} unreachable: {}", self.host, self.port, e);
				false
			}
		}
	}

	fn build_message(&self, message: &EmailMessage) -> ClResult<Message> {
		let to: Mailbox = message
			.to
			.parse()
			.map_err(|_| Error::ValidationError("Invalid recipient email format".into()))?;

		let builder = Message::builder().from(self.from.clone()).to(to).subject(&message.subject);

		match &message.html_body {
			Some(html_body) => builder.multipart(
				MultiPart::alternative()
					.singlepart(SinglePart::plain(message.text_body.clone()))
					.singlepart(SinglePart::html(html_body.clone())),
			),
			None => builder.singlepart(SinglePart::plain(message.text_body.clone())),
		}
		.map_err(|e| Error::ValidationError(format!("Failed to build email: {}", e)))
	}
}

fn tls_parameters(host: &str) -> ClResult<TlsParameters> {
	TlsParameters::builder(host.to_string())
		.build()
		.map_err(|e| Error::ConfigError(format!("TLS configuration error: {}", e)))
}

#[async_trait]
impl MailTransport for SmtpSender {
	async fn send(&self, message: &EmailMessage) -> ClResult<()> {
		let email = self.build_message(message)?;

		match self.mailer.send(email).await {
			Ok(response) => {
				debug!("Email accepted for {} (response: {:?})", message.to, response.code());
				Ok(())
			}
			Err(e) => {
				warn!("Failed to send email to {}: {}", message.to, e);
				Err(Error::ServiceUnavailable(format!("SMTP send failed: {}", e)))
			}
		}
	}
}


// vim: ts=4
