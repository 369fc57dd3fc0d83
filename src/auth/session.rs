//! Sign-in, sign-up, and sign-out against the identity endpoints.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenResponse, TokenSecret},
	client::ApiClient,
	error::{AuthError, DecodeError},
	http::{ApiRequest, ApiTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Email + password pair submitted to `/auth/login`.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: TokenSecret,
}
impl LoginCredentials {
	/// Creates a credential pair.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: TokenSecret::new(password) }
	}
}
impl Debug for LoginCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginCredentials")
			.field("email", &self.email)
			.field("password", &self.password)
			.finish()
	}
}

/// Profile submitted to `/auth/register`.
#[derive(Clone, Debug, Serialize)]
pub struct RegisterData {
	/// Display name.
	pub name: String,
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: TokenSecret,
}

impl<C> ApiClient<C>
where
	C: ?Sized + ApiTransport,
{
	/// Signs in and stores the returned session.
	pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenRecord> {
		self.open_session("login", credentials).await
	}

	/// Creates an account and stores the returned session.
	pub async fn register(&self, data: &RegisterData) -> Result<TokenRecord> {
		self.open_session("register", data).await
	}

	/// Signs out. The local session is cleared even when the server call fails.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Session;

		let span = FlowSpan::new(KIND, "logout");

		let result = span
			.instrument(async move {
				if self.vault().get().is_some() {
					let request = ApiRequest::post(self.endpoint(["auth", "logout"])?);

					// A rejected sign-out must not keep the user signed in locally.
					if let Err(e) = self.execute(request).await {
						obs::warn_event(KIND, "logout", &e);
					}
				}

				self.vault().clear().await
			})
			.await;

		span.settle(if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure });

		result
	}

	async fn open_session<B>(&self, action: &'static str, body: &B) -> Result<TokenRecord>
	where
		B: ?Sized + Serialize,
	{
		const KIND: FlowKind = FlowKind::Session;

		let span = FlowSpan::new(KIND, action);
		let result = span
			.instrument(async move {
				let request = ApiRequest::post(self.endpoint(["auth", action])?)
					.anonymous()
					.with_json_body(body, action)?;
				let record = self
					.execute(request)
					.await?
					.json::<TokenResponse>(action)?
					.into_record(None)
					.map_err(|source| DecodeError::Session { context: action, source })?;

				if record.refresh_token.is_empty() {
					return Err(AuthError::MissingRefreshToken.into());
				}

				self.vault().set(record.clone()).await?;

				Ok(record)
			})
			.await;

		span.settle(if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure });

		result
	}
}
