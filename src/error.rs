//! Crate-level error types shared by the vault, refresh coordinator, client, and mutation engine.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Secure-storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::storage::StorageError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Session is missing, could not be refreshed, or stayed unauthorized; callers must treat
	/// this as a forced logout.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Request or response body could not be encoded or decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Query cache held a value of an unexpected shape.
	#[error(transparent)]
	Cache(#[from] crate::cache::CacheError),

	/// Request exceeded the configured deadline.
	#[error("Request timed out before the server responded.")]
	Timeout,
	/// Server rejected the request with a 4xx status other than 401.
	#[error("Request was rejected with status {status}: {message}.")]
	Validation {
		/// HTTP status code.
		status: u16,
		/// Server- or client-supplied message.
		message: String,
	},
	/// Server failed with a 5xx status.
	#[error("Server failed with status {status}: {message}.")]
	Server {
		/// HTTP status code.
		status: u16,
		/// Server- or client-supplied message.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}
impl Error {
	/// Returns `true` when the error means the session is gone.
	pub fn is_auth(&self) -> bool {
		matches!(self, Self::Auth(_))
	}

	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
			Self::Auth(AuthError::RefreshRejected { status, .. }) => Some(*status),
			Self::Auth(AuthError::Unauthorized) => Some(401),
			_ => None,
		}
	}
}

/// Session failures. Every variant ends the session.
///
/// The type is `Clone` so one refresh outcome can be handed to every queued waiter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// No token record is stored.
	#[error("No authenticated session is available.")]
	NoSession,
	/// Stored record carries an empty refresh token.
	#[error("Stored session is missing a refresh token.")]
	MissingRefreshToken,
	/// Refresh endpoint rejected the refresh token.
	#[error("Refresh endpoint rejected the session with status {status}: {message}.")]
	RefreshRejected {
		/// HTTP status code.
		status: u16,
		/// Server-supplied message.
		message: String,
	},
	/// Refresh could not complete (transport, timeout, malformed body, or storage failure).
	#[error("Session refresh failed: {reason}.")]
	RefreshFailed {
		/// Rendered underlying failure.
		reason: String,
	},
	/// The caller driving the refresh went away before it settled.
	#[error("Session refresh was abandoned before it completed.")]
	RefreshAbandoned,
	/// Request stayed unauthorized after its single retry.
	#[error("Request remained unauthorized after refreshing the session.")]
	Unauthorized,
}

/// Configuration failures raised at runtime.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot carry path segments.
	#[error("Base URL `{url}` cannot be used to build endpoint paths.")]
	UnsupportedBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Invalid client configuration.
	#[error(transparent)]
	Client(#[from] crate::config::ClientConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Body encoding and decoding failures.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response JSON did not match the expected shape.
	#[error("Response body for {context} is malformed.")]
	Response {
		/// What was being decoded.
		context: &'static str,
		/// Structured parsing failure naming the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token body of a sign-in or sign-up response holds unusable values.
	#[error("Session returned by {context} is unusable.")]
	Session {
		/// Endpoint that returned the session.
		context: &'static str,
		/// Conversion failure.
		#[source]
		source: crate::auth::TokenRecordError,
	},
	/// Request body could not be serialized.
	#[error("Request body for {context} could not be encoded.")]
	Request {
		/// What was being encoded.
		context: &'static str,
		/// Serializer failure.
		#[source]
		source: serde_json::Error,
	},
}
