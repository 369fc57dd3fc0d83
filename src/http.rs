//! Transport primitives for API calls.
//!
//! [`ApiTransport`] is the crate's only dependency on an HTTP stack. It receives a fully
//! prepared [`ApiRequest`] (bearer already attached) and returns the raw [`ApiResponse`]
//! whatever its status; classifying statuses into errors is the client's job. Transports only
//! fail for conditions where no HTTP response exists at all: network faults and the request
//! deadline.

// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
#[cfg(feature = "reqwest")]
use crate::{
	config::ClientConfig,
	error::{ConfigError, TransportError},
};
use crate::{_prelude::*, auth::TokenSecret, error::DecodeError};

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to deliver an [`ApiRequest`].
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// client, the refresh coordinator, and the auto-refresh task behind an `Arc`.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the response, including non-2xx ones.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl HttpMethod {
	/// Returns the method name as sent on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(feature = "reqwest")]
impl From<HttpMethod> for reqwest::Method {
	fn from(method: HttpMethod) -> Self {
		match method {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Request handed to a transport.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Absolute endpoint URL.
	pub url: Url,
	/// JSON body, if any.
	pub body: Option<Vec<u8>>,
	/// Bearer credential attached by the client.
	pub bearer: Option<TokenSecret>,
	/// Whether the request should carry the session bearer at all.
	pub authenticated: bool,
	/// Set once the request has been resent after a 401.
	pub retried: bool,
}
impl ApiRequest {
	/// Creates an authenticated request without a body.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, body: None, bearer: None, authenticated: true, retried: false }
	}

	/// Shorthand for an authenticated `GET`.
	pub fn get(url: Url) -> Self {
		Self::new(HttpMethod::Get, url)
	}

	/// Shorthand for an authenticated `POST`.
	pub fn post(url: Url) -> Self {
		Self::new(HttpMethod::Post, url)
	}

	/// Shorthand for an authenticated `DELETE`.
	pub fn delete(url: Url) -> Self {
		Self::new(HttpMethod::Delete, url)
	}

	/// Marks the request as anonymous; no bearer is attached and 401s are not retried.
	pub fn anonymous(mut self) -> Self {
		self.authenticated = false;

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json_body<T>(mut self, body: &T, context: &'static str) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let bytes =
			serde_json::to_vec(body).map_err(|source| DecodeError::Request { context, source })?;

		self.body = Some(bytes);

		Ok(self)
	}
}

/// Response returned by a transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw body bytes.
	pub body: Vec<u8>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ApiResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into(), retry_after: None }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body, reporting the JSON path that failed to match.
	pub fn json<T>(&self, context: &'static str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| DecodeError::Response { context, source }.into())
	}

	/// Extracts a human-readable message from an error body.
	///
	/// Looks for a `message` or `error` string field and falls back to the status line.
	pub fn error_message(&self) -> String {
		#[derive(Deserialize)]
		struct ErrorBody {
			#[serde(default)]
			message: Option<String>,
			#[serde(default)]
			error: Option<String>,
		}

		serde_json::from_slice::<ErrorBody>(&self.body)
			.ok()
			.and_then(|body| body.message.or(body.error))
			.filter(|message| !message.trim().is_empty())
			.unwrap_or_else(|| format!("HTTP {}", self.status))
	}
}

/// Reqwest-backed transport applying a per-request deadline.
///
/// Every request carries a deadline, so a stalled upstream always surfaces as
/// [`Error::Timeout`]. Redirects are followed according to the wrapped client's policy.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	timeout: StdDuration,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a fresh client and the given deadline.
	pub fn new(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Ok(Self::with_client(client).with_timeout(timeout))
	}

	/// Wraps an existing reqwest [`ReqwestClient`] with [`ClientConfig::DEFAULT_TIMEOUT`].
	///
	/// Chain [`with_timeout`](Self::with_timeout), or build the API client through
	/// [`ApiClient::with_reqwest_client`](crate::client::ApiClient::with_reqwest_client), to
	/// apply a configured deadline instead.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: ClientConfig::DEFAULT_TIMEOUT }
	}

	/// Overrides the per-request deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Per-request deadline.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestTransport {
	fn default() -> Self {
		Self::with_client(ReqwestClient::default())
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let mut builder = self
				.client
				.request(request.method.into(), request.url)
				.timeout(self.timeout)
				.header(ACCEPT, HeaderValue::from_static("application/json"));

			if let Some(bearer) = request.bearer.as_ref() {
				builder = builder.bearer_auth(bearer.expose());
			}
			if let Some(body) = request.body {
				builder =
					builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json")).body(body);
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

			Ok(ApiResponse { status, body, retry_after })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(e: ReqwestError) -> Error {
	if e.is_timeout() {
		Error::Timeout
	} else if e.is_builder() {
		ConfigError::from(e).into()
	} else {
		TransportError::from(e).into()
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Flag {
		#[serde(rename = "isFavorite")]
		_is_favorite: bool,
	}

	#[test]
	fn error_message_prefers_message_then_error_then_status() {
		assert_eq!(ApiResponse::new(422, r#"{"message":"Invalid type"}"#).error_message(), "Invalid type");
		assert_eq!(ApiResponse::new(400, r#"{"error":"bad_request"}"#).error_message(), "bad_request");
		assert_eq!(ApiResponse::new(502, "<html>gateway</html>").error_message(), "HTTP 502");
		assert_eq!(ApiResponse::new(500, r#"{"message":"  "}"#).error_message(), "HTTP 500");
	}

	#[test]
	fn json_reports_the_failing_path() {
		let response = ApiResponse::new(200, r#"{"isFavorite":"yes"}"#);
		let err = response.json::<Flag>("favorite check").expect_err("Type mismatch should fail.");

		match err {
			Error::Decode(DecodeError::Response { context, source }) => {
				assert_eq!(context, "favorite check");
				assert_eq!(source.path().to_string(), "isFavorite");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn request_builders_default_to_authenticated() {
		let url = Url::parse("https://api.example.com/favorites").expect("Fixture URL should parse.");
		let request = ApiRequest::post(url.clone())
			.with_json_body(&serde_json::json!({ "eventId": "e1" }), "favorite add")
			.expect("Body should encode.");

		assert!(request.authenticated);
		assert!(!request.retried);
		assert_eq!(request.body.as_deref(), Some(br#"{"eventId":"e1"}"#.as_slice()));
		assert!(!ApiRequest::get(url).anonymous().authenticated);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn wrapped_reqwest_clients_keep_a_bounded_deadline() {
		let wrapped = ReqwestTransport::with_client(ReqwestClient::new());

		assert_eq!(wrapped.timeout(), ClientConfig::DEFAULT_TIMEOUT);
		assert_eq!(ReqwestTransport::default().timeout(), ClientConfig::DEFAULT_TIMEOUT);
		assert_eq!(
			wrapped.with_timeout(StdDuration::from_millis(250)).timeout(),
			StdDuration::from_millis(250)
		);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn parse_retry_after_supports_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}
}
