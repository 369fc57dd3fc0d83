//! Validated client configuration.
//!
//! [`ClientConfig`] carries the API base URL plus the timing knobs of the access layer: the
//! per-request deadline, the expiry buffer that triggers a proactive refresh, and the cadence
//! of the background refresh check. Build it through [`ClientConfig::builder`], which rejects
//! plain-HTTP base URLs unless they point at a loopback host.

// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{_prelude::*, error::ConfigError};

/// Errors raised while validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ClientConfigError {
	/// Base URL must use HTTPS (loopback hosts excepted).
	#[error("The base URL must use HTTPS: {url}.")]
	InsecureBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Base URL must be hierarchical so endpoint paths can be appended.
	#[error("The base URL cannot carry endpoint paths: {url}.")]
	OpaqueBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Request timeout must be positive.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
	/// Auto-refresh cadence must be positive.
	#[error("Auto-refresh interval must be greater than zero.")]
	ZeroAutoRefreshInterval,
	/// Expiry buffer cannot be negative.
	#[error("Refresh buffer cannot be negative.")]
	NegativeRefreshBuffer,
}

/// Validated configuration shared by the client, coordinator, and auto-refresh task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	/// Base URL every endpoint path is appended to; always ends with `/`.
	pub base_url: Url,
	/// Deadline applied to every request, including refresh calls.
	pub timeout: StdDuration,
	/// How long before expiry a session is proactively refreshed.
	pub refresh_buffer: Duration,
	/// Cadence of the background expiry check.
	pub auto_refresh_interval: StdDuration,
}
impl ClientConfig {
	/// Default request deadline.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default expiry buffer.
	pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::minutes(5);
	/// Default background check cadence.
	pub const DEFAULT_AUTO_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);

	/// Returns a builder seeded with `base_url` and default timings.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Builds an endpoint URL from path segments, percent-encoding each one.
	pub fn endpoint<I, S>(&self, segments: I) -> Result<Url, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut url = self.base_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::UnsupportedBaseUrl { url: self.base_url.to_string() })?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// API base URL.
	pub base_url: Url,
	/// Request deadline.
	pub timeout: StdDuration,
	/// Expiry buffer.
	pub refresh_buffer: Duration,
	/// Background check cadence.
	pub auto_refresh_interval: StdDuration,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			timeout: ClientConfig::DEFAULT_TIMEOUT,
			refresh_buffer: ClientConfig::DEFAULT_REFRESH_BUFFER,
			auto_refresh_interval: ClientConfig::DEFAULT_AUTO_REFRESH_INTERVAL,
		}
	}

	/// Overrides the request deadline.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the expiry buffer.
	pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
		self.refresh_buffer = buffer;

		self
	}

	/// Overrides the background check cadence.
	pub fn auto_refresh_interval(mut self, interval: StdDuration) -> Self {
		self.auto_refresh_interval = interval;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let mut base_url = self.base_url;

		validate_base_url(&base_url)?;

		if self.timeout.is_zero() {
			return Err(ClientConfigError::ZeroTimeout);
		}
		if self.auto_refresh_interval.is_zero() {
			return Err(ClientConfigError::ZeroAutoRefreshInterval);
		}
		if self.refresh_buffer.is_negative() {
			return Err(ClientConfigError::NegativeRefreshBuffer);
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		base_url.set_query(None);
		base_url.set_fragment(None);

		Ok(ClientConfig {
			base_url,
			timeout: self.timeout,
			refresh_buffer: self.refresh_buffer,
			auto_refresh_interval: self.auto_refresh_interval,
		})
	}
}

fn validate_base_url(url: &Url) -> Result<(), ClientConfigError> {
	if url.cannot_be_a_base() {
		return Err(ClientConfigError::OpaqueBaseUrl { url: url.to_string() });
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ClientConfigError::InsecureBaseUrl { url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
