//! Authenticated API client with a single-retry 401 interceptor.
//!
//! Every request goes through [`ApiClient::execute`]. Before sending, the client attaches the
//! vault's access token as a bearer credential. A 401 on an authenticated request triggers
//! exactly one refresh through the shared [`TokenRefreshCoordinator`] followed by one resend;
//! a second 401 surfaces as [`AuthError::Unauthorized`]. All other failures pass through
//! untouched: no refresh and no retry happen at this layer.

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	error::AuthError,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, FlowKind, FlowOutcome},
	refresh::TokenRefreshCoordinator,
	vault::TokenVault,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// One page of a paginated listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
	/// Items on this page.
	pub data: Vec<T>,
	/// Total number of items across all pages.
	pub total: u64,
	/// 1-based page number.
	pub page: u32,
	/// Page size requested.
	pub limit: u32,
	/// Whether another page follows.
	#[serde(default)]
	pub has_more: bool,
}

/// Pagination parameters for listing endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
	/// 1-based page number.
	pub page: u32,
	/// Page size.
	pub limit: u32,
}
impl PageRequest {
	/// Creates a request for `page` with `limit` items.
	pub const fn new(page: u32, limit: u32) -> Self {
		Self { page, limit }
	}
}
impl Default for PageRequest {
	fn default() -> Self {
		Self::new(1, 20)
	}
}

/// Authenticated API client shared by the session and mutation layers.
pub struct ApiClient<C>
where
	C: ?Sized + ApiTransport,
{
	config: ClientConfig,
	transport: Arc<C>,
	vault: Arc<TokenVault>,
	coordinator: Arc<TokenRefreshCoordinator<C>>,
}
impl<C> ApiClient<C>
where
	C: ?Sized + ApiTransport,
{
	/// Creates a client that sends through `transport` and owns a new refresh coordinator.
	pub fn with_transport(
		config: ClientConfig,
		vault: Arc<TokenVault>,
		transport: impl Into<Arc<C>>,
	) -> Result<Self> {
		let transport = transport.into();
		let coordinator =
			Arc::new(TokenRefreshCoordinator::new(&config, vault.clone(), transport.clone())?);

		Ok(Self { config, transport, vault, coordinator })
	}

	/// Returns the configuration this client was built with.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Returns the session vault.
	pub fn vault(&self) -> &Arc<TokenVault> {
		&self.vault
	}

	/// Returns the refresh coordinator guarding this client's session.
	pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator<C>> {
		&self.coordinator
	}

	/// Builds an endpoint URL under the configured base URL.
	pub fn endpoint<I, S>(&self, segments: I) -> Result<Url>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		Ok(self.config.endpoint(segments)?)
	}

	/// Sends `request`, refreshing and resending once on 401, and classifies the final status.
	///
	/// Resolves with the response for 2xx statuses only.
	pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.execute_inner(request).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn execute_inner(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		if request.authenticated {
			request.bearer = self.vault.access_token();
		}

		let response = self.transport.send(request.clone()).await?;

		if response.status != 401 || !request.authenticated || request.retried {
			return classify(response, &request);
		}

		let token = self.coordinator.refresh_after_unauthorized(request.bearer.as_ref()).await?;

		request.bearer = Some(token);
		request.retried = true;

		let response = self.transport.send(request.clone()).await?;

		classify(response, &request)
	}

	/// `GET`s `segments` and decodes the JSON body.
	pub async fn get_json<T, I, S>(&self, segments: I, context: &'static str) -> Result<T>
	where
		T: DeserializeOwned,
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let request = ApiRequest::get(self.endpoint(segments)?);

		self.execute(request).await?.json(context)
	}

	/// `GET`s `url` (query string included) and decodes the JSON body.
	pub async fn get_json_url<T>(&self, url: Url, context: &'static str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.execute(ApiRequest::get(url)).await?.json(context)
	}

	/// `POST`s `body` as JSON to `segments` and decodes the JSON response.
	pub async fn post_json<B, T, I, S>(
		&self,
		segments: I,
		body: &B,
		context: &'static str,
	) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let request = ApiRequest::post(self.endpoint(segments)?).with_json_body(body, context)?;

		self.execute(request).await?.json(context)
	}

	/// `DELETE`s `segments`, ignoring the response body.
	pub async fn delete<I, S>(&self, segments: I) -> Result<()>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.execute(ApiRequest::delete(self.endpoint(segments)?)).await?;

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client over a fresh reqwest transport using `config.timeout`.
	pub fn new(config: ClientConfig, vault: Arc<TokenVault>) -> Result<Self> {
		let transport = ReqwestTransport::new(config.timeout)?;

		Self::with_transport(config, vault, transport)
	}

	/// Creates a client over a caller-built reqwest client, applying `config.timeout` to
	/// every request.
	pub fn with_reqwest_client(
		config: ClientConfig,
		vault: Arc<TokenVault>,
		client: ReqwestClient,
	) -> Result<Self> {
		let transport = ReqwestTransport::with_client(client).with_timeout(config.timeout);

		Self::with_transport(config, vault, transport)
	}
}
impl<C> Clone for ApiClient<C>
where
	C: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			vault: self.vault.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<C> Debug for ApiClient<C>
where
	C: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("vault", &self.vault)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

fn classify(response: ApiResponse, request: &ApiRequest) -> Result<ApiResponse> {
	match response.status {
		200..=299 => Ok(response),
		401 if request.authenticated => Err(AuthError::Unauthorized.into()),
		status @ 500..=u16::MAX => Err(Error::Server {
			status,
			message: response.error_message(),
			retry_after: response.retry_after,
		}),
		status => Err(Error::Validation { status, message: response.error_message() }),
	}
}
