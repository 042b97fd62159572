//! Environment configuration

use std::{path::PathBuf, str::FromStr, time::Duration};

use cadence::email::{SmtpConfig, TlsMode};
use cadence::prelude::*;
use cadence::scheduler::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
	pub db_dir: PathBuf,
	pub smtp: SmtpConfig,
	pub max_emails_per_hour: u32,
	/// Delay queue ceiling across all users, defaults to `max_emails_per_hour` (0: none)
	pub queue_jobs_per_hour: u32,
	pub min_delay_between_emails: Duration,
	pub worker_concurrency: usize,
	pub fail_open: bool,
	pub processing_lock_ttl: Duration,
	pub drain_timeout: Duration,
	pub retry: RetryPolicy,
}

impl Config {
	pub fn from_env() -> ClResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Read every setting through `lookup`, falling back to defaults for unset or blank values
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClResult<Self> {
		let get = |name: &str| {
			lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
		};

		let smtp_defaults = SmtpConfig::default();
		let smtp = SmtpConfig {
			host: get("SMTP_HOST").unwrap_or(smtp_defaults.host),
			port: parse_or(&get, "SMTP_PORT", 587)?,
			username: get("SMTP_USER"),
			password: get("SMTP_PASS"),
			from_address: get("SMTP_FROM").unwrap_or(smtp_defaults.from_address),
			from_name: get("SMTP_FROM_NAME").unwrap_or(smtp_defaults.from_name),
			tls_mode: match get("SMTP_TLS") {
				Some(mode) => mode.to_ascii_lowercase().parse::<TlsMode>()?,
				None => TlsMode::StartTls,
			},
			timeout: Duration::from_secs(parse_or(&get, "SMTP_TIMEOUT_SECS", 30)?),
		};

		let retry_attempts: u16 = parse_or(&get, "RETRY_ATTEMPTS", 2)?;
		let retry_backoff: u64 = parse_or(&get, "RETRY_BACKOFF_SECS", 5)?;
		let max_emails_per_hour = parse_or(&get, "MAX_EMAILS_PER_HOUR", 200)?;

		Ok(Config {
			db_dir: PathBuf::from(get("DB_DIR").unwrap_or_else(|| "./data".into())),
			smtp,
			max_emails_per_hour,
			queue_jobs_per_hour: parse_or(&get, "QUEUE_JOBS_PER_HOUR", max_emails_per_hour)?,
			min_delay_between_emails: Duration::from_millis(parse_or(
				&get,
				"MIN_DELAY_BETWEEN_EMAILS_MS",
				2000,
			)?),
			worker_concurrency: parse_or(&get, "WORKER_CONCURRENCY", 5)?,
			fail_open: match get("RATE_LIMIT_FAIL_OPEN") {
				Some(v) => parse_bool("RATE_LIMIT_FAIL_OPEN", &v)?,
				None => true,
			},
			processing_lock_ttl: Duration::from_secs(parse_or(&get, "PROCESSING_LOCK_TTL_SECS", 300)?),
			drain_timeout: Duration::from_secs(parse_or(&get, "DRAIN_TIMEOUT_SECS", 30)?),
			retry: RetryPolicy::new((retry_backoff, 3600), retry_attempts),
		})
	}
}

fn parse_or<T: FromStr>(
	get: &impl Fn(&str) -> Option<String>,
	name: &str,
	default: T,
) -> ClResult<T>
where
	T::Err: std::fmt::Display,
{
	match get(name) {
		Some(v) => v
			.parse::<T>()
			.map_err(|e| Error::ConfigError(format!("{} is invalid ({}): {}", name, v, e))),
		None => Ok(default),
	}
}

fn parse_bool(name: &str, value: &str) -> ClResult<bool> {
	match value.to_ascii_lowercase().as_str() {
		"true" | "1" | "yes" | "y" => Ok(true),
		"false" | "0" | "no" | "n" => Ok(false),
		_ => Err(Error::ConfigError(format!("{} must be a boolean (true/false/1/0)", name))),
	}
}


// vim: ts=4
