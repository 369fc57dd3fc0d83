//! Session token record, its persisted form, and the token endpoint payload.

// self
use crate::{
	_prelude::*,
	auth::token::secret::{REDACTED, TokenSecret},
};

/// Errors produced while converting wire or stored expiry values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordError {
	/// Expiry timestamp cannot be represented as a date-time.
	#[error("Expiry timestamp {value} is out of range.")]
	ExpiryOutOfRange {
		/// Raw timestamp value.
		value: i64,
	},
	/// Token endpoint returned an empty access token.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Current access/refresh token pair and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Access token attached to authenticated requests.
	pub access_token: TokenSecret,
	/// Refresh token exchanged for a new pair.
	pub refresh_token: TokenSecret,
	/// Expiry instant of the access token, when the identity provider reported one.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Creates a record without an expiry.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at: None,
		}
	}

	/// Sets the absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the expiry relative to the current clock.
	pub fn expiring_in(self, duration: Duration) -> Self {
		self.with_expires_at(OffsetDateTime::now_utc() + duration)
	}

	/// Returns `true` once `now` is within `buffer` of the expiry.
	///
	/// Records without an expiry are always considered expired.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		match self.expires_at {
			Some(expires_at) => now >= expires_at - buffer,
			None => true,
		}
	}

	/// Expiry as Unix epoch milliseconds.
	pub fn expires_at_ms(&self) -> Option<i64> {
		self.expires_at.and_then(|at| i64::try_from(at.unix_timestamp_nanos() / 1_000_000).ok())
	}

	pub(crate) fn to_stored(&self) -> StoredTokenRecord {
		StoredTokenRecord {
			access_token: self.access_token.expose().to_owned(),
			refresh_token: self.refresh_token.expose().to_owned(),
			expires_at_ms: self.expires_at_ms(),
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &REDACTED)
			.field("refresh_token", &REDACTED)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Persisted form of a [`TokenRecord`], written as one document so the pair and its expiry
/// never disagree on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredTokenRecord {
	pub(crate) access_token: String,
	pub(crate) refresh_token: String,
	pub(crate) expires_at_ms: Option<i64>,
}
impl StoredTokenRecord {
	pub(crate) fn into_record(self) -> Result<TokenRecord, TokenRecordError> {
		let expires_at = self
			.expires_at_ms
			.map(|ms| {
				OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
					.map_err(|_| TokenRecordError::ExpiryOutOfRange { value: ms })
			})
			.transpose()?;

		Ok(TokenRecord {
			access_token: TokenSecret::new(self.access_token),
			refresh_token: TokenSecret::new(self.refresh_token),
			expires_at,
		})
	}
}

/// Token body returned by the login, register, and refresh endpoints.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
	/// New access token.
	pub access_token: String,
	/// New refresh token; absent when the provider does not rotate it.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Expiry as Unix epoch seconds.
	#[serde(default)]
	pub expires_at: Option<i64>,
}
impl TokenResponse {
	/// Builds a record, keeping `previous_refresh` when the response does not rotate it.
	pub fn into_record(
		self,
		previous_refresh: Option<&TokenSecret>,
	) -> Result<TokenRecord, TokenRecordError> {
		if self.access_token.is_empty() {
			return Err(TokenRecordError::MissingAccessToken);
		}

		let refresh_token = match (self.refresh_token, previous_refresh) {
			(Some(fresh), _) => TokenSecret::new(fresh),
			(None, Some(previous)) => previous.clone(),
			(None, None) => TokenSecret::new(String::new()),
		};
		let expires_at = self
			.expires_at
			.map(|secs| {
				OffsetDateTime::from_unix_timestamp(secs)
					.map_err(|_| TokenRecordError::ExpiryOutOfRange { value: secs })
			})
			.transpose()?;

		Ok(TokenRecord { access_token: TokenSecret::new(self.access_token), refresh_token, expires_at })
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("access_token", &REDACTED)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
