//! Credential strings that must never reach logs.
//!
//! Access tokens, refresh tokens, and account passwords all travel as [`TokenSecret`]. Its
//! formatters print a fixed marker, while serde still writes the raw string so request bodies
//! and the persisted session document carry the real value.

// self
use crate::_prelude::*;

/// Marker printed in place of any credential.
pub(crate) const REDACTED: &str = "<redacted>";

/// Token or password whose `Debug` and `Display` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a credential.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw credential, for the bearer header and request bodies only.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// An empty refresh token means the session cannot be renewed.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&REDACTED).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}
