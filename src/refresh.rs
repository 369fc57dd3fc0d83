//! Single-flight session refresh.
//!
//! [`TokenRefreshCoordinator`] guarantees that at most one `POST /auth/refresh` call is in
//! flight. The first caller that needs a new token becomes the leader and performs the call;
//! every caller arriving while it runs is queued as a waiter and receives the leader's
//! outcome, in arrival order, once the refresh settles. Refresh tokens are typically
//! single-use, so a second concurrent call would invalidate the session for whoever lost.
//!
//! A failed refresh always ends the session: the vault is cleared, every waiter is rejected
//! with the same [`AuthError`], and the registered [`SessionObserver`] is told. If the leader's
//! future is dropped before the refresh settles, the coordinator returns to idle and waiters
//! are rejected with [`AuthError::RefreshAbandoned`] instead of hanging.

pub mod auto;

mod metrics;

pub use auto::*;
pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{TokenResponse, TokenSecret},
	config::ClientConfig,
	error::AuthError,
	http::{ApiRequest, ApiTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	vault::TokenVault,
};

type RefreshOutcome = Result<TokenSecret, AuthError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// Receives a notice whenever a failed refresh ends the session.
///
/// Implementations typically route the user back to the sign-in screen.
pub trait SessionObserver
where
	Self: Send + Sync,
{
	/// Called once per failed refresh, after the vault has been cleared.
	fn session_terminated(&self, reason: &AuthError);
}

/// Coordinates session refreshes so overlapping triggers share one network call.
pub struct TokenRefreshCoordinator<C>
where
	C: ?Sized + ApiTransport,
{
	/// Shared counters for refresh outcomes.
	pub metrics: Arc<RefreshMetrics>,
	transport: Arc<C>,
	vault: Arc<TokenVault>,
	refresh_url: Url,
	buffer: Duration,
	state: Mutex<RefreshState>,
	observer: RwLock<Option<Arc<dyn SessionObserver>>>,
}
impl<C> TokenRefreshCoordinator<C>
where
	C: ?Sized + ApiTransport,
{
	/// Creates an idle coordinator refreshing against `config`'s `/auth/refresh` endpoint.
	pub fn new(
		config: &ClientConfig,
		vault: Arc<TokenVault>,
		transport: impl Into<Arc<C>>,
	) -> Result<Self> {
		Ok(Self {
			metrics: Default::default(),
			transport: transport.into(),
			vault,
			refresh_url: config.endpoint(["auth", "refresh"])?,
			buffer: config.refresh_buffer,
			state: Mutex::new(RefreshState::Idle),
			observer: RwLock::new(None),
		})
	}

	/// Returns the vault this coordinator refreshes.
	pub fn vault(&self) -> &Arc<TokenVault> {
		&self.vault
	}

	/// Registers the observer told about forced logouts, replacing any previous one.
	pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
		*self.observer.write() = Some(observer);
	}

	/// Returns `true` while a refresh call is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(*self.state.lock(), RefreshState::Refreshing { .. })
	}

	/// Returns a usable access token, refreshing first when the session is within the expiry
	/// buffer.
	pub async fn ensure_fresh_token(&self) -> Result<TokenSecret, AuthError> {
		self.acquire(Trigger::Expiry, "ensure_fresh_token").await
	}

	/// Returns a token to retry a request that was rejected with 401 while carrying `stale`.
	///
	/// If the session already moved on to a different access token, that token is returned
	/// without a network call.
	pub async fn refresh_after_unauthorized(
		&self,
		stale: Option<&TokenSecret>,
	) -> Result<TokenSecret, AuthError> {
		self.acquire(Trigger::Unauthorized(stale), "refresh_after_unauthorized").await
	}

	/// Refreshes regardless of expiry, joining a refresh that is already running.
	pub async fn force_refresh(&self) -> Result<TokenSecret, AuthError> {
		self.acquire(Trigger::Forced, "force_refresh").await
	}

	/// Refreshes when a session exists and is within the expiry buffer.
	///
	/// Resolves to `None` without a session, which is what background checks want.
	pub async fn refresh_if_expired(&self) -> Result<Option<TokenSecret>, AuthError> {
		if self.vault.get().is_none() {
			return Ok(None);
		}

		self.ensure_fresh_token().await.map(Some)
	}

	async fn acquire(&self, trigger: Trigger<'_>, stage: &'static str) -> RefreshOutcome {
		match self.claim(trigger)? {
			Role::Ready(token) => Ok(token),
			Role::Waiter(rx) => rx.await.unwrap_or(Err(AuthError::RefreshAbandoned)),
			Role::Leader => self.lead(stage).await,
		}
	}

	fn claim(&self, trigger: Trigger<'_>) -> Result<Role, AuthError> {
		let mut state = self.state.lock();

		if let RefreshState::Refreshing { waiters } = &mut *state {
			let (tx, rx) = oneshot::channel();

			waiters.push_back(tx);
			self.metrics.record_joined();

			return Ok(Role::Waiter(rx));
		}

		// The leader writes the vault before returning to idle, so an idle state always sees
		// the latest session here.
		let current = self.vault.get().ok_or(AuthError::NoSession)?;
		let reusable = match trigger {
			Trigger::Expiry => !current.is_expired_at(OffsetDateTime::now_utc(), self.buffer),
			Trigger::Unauthorized(stale) => stale != Some(&current.access_token),
			Trigger::Forced => false,
		};

		if reusable {
			return Ok(Role::Ready(current.access_token));
		}

		*state = RefreshState::Refreshing { waiters: VecDeque::new() };

		Ok(Role::Leader)
	}

	async fn lead(&self, stage: &'static str) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let flight = FlightGuard { state: &self.state, armed: true };
		let span = FlowSpan::new(KIND, stage);

		self.metrics.record_attempt();

		let outcome = span.instrument(self.exchange()).await;

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				span.settle(FlowOutcome::Success);
			},
			Err(reason) => {
				self.metrics.record_failure();
				span.settle(FlowOutcome::Failure);
				obs::warn_event(KIND, stage, reason);

				if let Err(e) = self.vault.clear().await {
					obs::warn_event(KIND, "vault_clear", &e);
				}

				let observer = self.observer.read().clone();

				if let Some(observer) = observer {
					observer.session_terminated(reason);
				}
			},
		}

		flight.settle(&outcome);

		outcome
	}

	async fn exchange(&self) -> RefreshOutcome {
		#[derive(Serialize)]
		struct RefreshBody<'a> {
			refresh_token: &'a str,
		}

		let current = self.vault.get().ok_or(AuthError::NoSession)?;

		if current.refresh_token.is_empty() {
			return Err(AuthError::MissingRefreshToken);
		}

		let request = ApiRequest::post(self.refresh_url.clone())
			.anonymous()
			.with_json_body(
				&RefreshBody { refresh_token: current.refresh_token.expose() },
				"session refresh",
			)
			.map_err(refresh_failed)?;
		let response = self.transport.send(request).await.map_err(refresh_failed)?;

		if !response.is_success() {
			return Err(AuthError::RefreshRejected {
				status: response.status,
				message: response.error_message(),
			});
		}

		let record = response
			.json::<TokenResponse>("session refresh")
			.map_err(refresh_failed)?
			.into_record(Some(&current.refresh_token))
			.map_err(refresh_failed)?;
		let token = record.access_token.clone();

		self.vault.set(record).await.map_err(refresh_failed)?;

		Ok(token)
	}
}
impl<C> Debug for TokenRefreshCoordinator<C>
where
	C: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefreshCoordinator")
			.field("refresh_url", &self.refresh_url.as_str())
			.field("buffer", &self.buffer)
			.field("refreshing", &self.is_refreshing())
			.field("metrics", &self.metrics)
			.finish()
	}
}

enum RefreshState {
	Idle,
	Refreshing { waiters: VecDeque<Waiter> },
}

enum Role {
	Ready(TokenSecret),
	Waiter(oneshot::Receiver<RefreshOutcome>),
	Leader,
}

#[derive(Clone, Copy)]
enum Trigger<'a> {
	Expiry,
	Unauthorized(Option<&'a TokenSecret>),
	Forced,
}

/// Returns the coordinator to idle when the leader settles or is dropped.
struct FlightGuard<'a> {
	state: &'a Mutex<RefreshState>,
	armed: bool,
}
impl FlightGuard<'_> {
	fn settle(mut self, outcome: &RefreshOutcome) {
		self.armed = false;

		let waiters = take_waiters(self.state);

		obs::record_refresh_fan_out(waiters.len());

		// FIFO.
		for waiter in waiters {
			let _ = waiter.send(outcome.clone());
		}
	}
}
impl Drop for FlightGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			// Dropping the senders rejects every waiter.
			drop(take_waiters(self.state));
		}
	}
}

fn take_waiters(state: &Mutex<RefreshState>) -> VecDeque<Waiter> {
	let previous = std::mem::replace(&mut *state.lock(), RefreshState::Idle);

	match previous {
		RefreshState::Refreshing { waiters } => waiters,
		RefreshState::Idle => VecDeque::new(),
	}
}

fn refresh_failed(e: impl Display) -> AuthError {
	AuthError::RefreshFailed { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::TokenRecord,
		http::{ApiResponse, HttpMethod},
	};

	#[derive(Default)]
	struct CountingObserver(AtomicUsize);
	impl SessionObserver for CountingObserver {
		fn session_terminated(&self, _reason: &AuthError) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn rotating_transport(delay: StdDuration) -> ScriptedTransport {
		ScriptedTransport::default().delayed_route(
			HttpMethod::Post,
			"/auth/refresh",
			delay,
			|_| Ok(token_response("a2", "r2")),
		)
	}

	async fn coordinator(
		transport: ScriptedTransport,
		record: TokenRecord,
	) -> (Arc<TokenRefreshCoordinator<ScriptedTransport>>, Arc<ScriptedTransport>) {
		let transport = Arc::new(transport);
		let vault = seeded_vault(record).await;
		let coordinator = TokenRefreshCoordinator::new(&test_config(), vault, transport.clone())
			.expect("Coordinator should build.");

		(Arc::new(coordinator), transport)
	}

	#[tokio::test]
	async fn fresh_session_is_returned_without_a_network_call() {
		let (coordinator, transport) = coordinator(
			rotating_transport(StdDuration::ZERO),
			TokenRecord::new("a1", "r1").expiring_in(Duration::hours(1)),
		)
		.await;
		let token = coordinator.ensure_fresh_token().await.expect("Fresh token should be returned.");

		assert_eq!(token.expose(), "a1");
		assert_eq!(transport.calls(HttpMethod::Post, "/auth/refresh"), 0);
		assert_eq!(coordinator.metrics.attempts(), 0);
	}

	#[tokio::test]
	async fn overlapping_triggers_share_one_refresh() {
		let (coordinator, transport) = coordinator(
			rotating_transport(StdDuration::from_millis(50)),
			TokenRecord::new("a1", "r1").expiring_in(Duration::minutes(1)),
		)
		.await;
		let tasks = (0..5)
			.map(|_| {
				let coordinator = coordinator.clone();

				tokio::spawn(async move { coordinator.ensure_fresh_token().await })
			})
			.collect::<Vec<_>>();

		for task in tasks {
			let token = task.await.expect("Refresh task should not panic.").expect("Refresh should succeed.");

			assert_eq!(token.expose(), "a2");
		}

		assert_eq!(transport.calls(HttpMethod::Post, "/auth/refresh"), 1);
		assert_eq!(coordinator.metrics.attempts(), 1);
		assert_eq!(coordinator.metrics.joined(), 4);
		assert!(!coordinator.is_refreshing());

		let stored = coordinator.vault().get().expect("Refreshed session should be stored.");

		assert_eq!(stored.refresh_token.expose(), "r2");

		let sent = transport.sent();

		assert_eq!(sent[0].body.as_deref(), Some(br#"{"refresh_token":"r1"}"#.as_slice()));
		assert!(sent[0].bearer.is_none());
	}

	#[tokio::test]
	async fn failure_rejects_everyone_and_ends_the_session() {
		let transport = ScriptedTransport::default().delayed_route(
			HttpMethod::Post,
			"/auth/refresh",
			StdDuration::from_millis(30),
			|_| Ok(ApiResponse::new(401, r#"{"message":"Refresh token revoked"}"#)),
		);
		let (coordinator, _) =
			coordinator(transport, TokenRecord::new("a1", "r1").expiring_in(Duration::ZERO)).await;
		let observer = Arc::new(CountingObserver::default());

		coordinator.set_observer(observer.clone());

		let tasks = (0..3)
			.map(|_| {
				let coordinator = coordinator.clone();

				tokio::spawn(async move { coordinator.force_refresh().await })
			})
			.collect::<Vec<_>>();

		for task in tasks {
			let err = task.await.expect("Refresh task should not panic.").expect_err("Refresh should fail.");

			assert_eq!(err, AuthError::RefreshRejected {
				status: 401,
				message: "Refresh token revoked".into()
			});
		}

		assert!(coordinator.vault().get().is_none());
		assert_eq!(observer.0.load(Ordering::SeqCst), 1);
		assert_eq!(coordinator.metrics.failures(), 1);
		assert_eq!(coordinator.ensure_fresh_token().await, Err(AuthError::NoSession));
	}

	#[tokio::test]
	async fn dropped_leader_releases_waiters() {
		let (coordinator, _) = coordinator(
			rotating_transport(StdDuration::from_secs(5)),
			TokenRecord::new("a1", "r1").expiring_in(Duration::hours(1)),
		)
		.await;
		let leader = tokio::spawn({
			let coordinator = coordinator.clone();

			async move { coordinator.force_refresh().await }
		});

		tokio::time::sleep(StdDuration::from_millis(20)).await;

		assert!(coordinator.is_refreshing());

		let waiter = tokio::spawn({
			let coordinator = coordinator.clone();

			async move { coordinator.ensure_fresh_token().await }
		});

		tokio::time::sleep(StdDuration::from_millis(20)).await;
		leader.abort();

		let outcome = waiter.await.expect("Waiter task should not panic.");

		assert_eq!(outcome, Err(AuthError::RefreshAbandoned));
		assert!(!coordinator.is_refreshing());
		assert_eq!(coordinator.vault().access_token().map(|t| t.expose().to_owned()), Some("a1".into()));
	}

	#[tokio::test]
	async fn late_unauthorized_reuses_the_newer_token() {
		let (coordinator, transport) = coordinator(
			rotating_transport(StdDuration::ZERO),
			TokenRecord::new("a1", "r1").expiring_in(Duration::hours(1)),
		)
		.await;
		let stale = TokenSecret::new("a0");
		let token = coordinator
			.refresh_after_unauthorized(Some(&stale))
			.await
			.expect("Newer token should be reused.");

		assert_eq!(token.expose(), "a1");
		assert_eq!(transport.calls(HttpMethod::Post, "/auth/refresh"), 0);

		let current = TokenSecret::new("a1");
		let token = coordinator
			.refresh_after_unauthorized(Some(&current))
			.await
			.expect("Matching token should trigger a refresh.");

		assert_eq!(token.expose(), "a2");
		assert_eq!(transport.calls(HttpMethod::Post, "/auth/refresh"), 1);
	}

	#[tokio::test]
	async fn missing_refresh_token_ends_the_session() {
		let (coordinator, transport) =
			coordinator(rotating_transport(StdDuration::ZERO), TokenRecord::new("a1", "")).await;

		assert_eq!(coordinator.force_refresh().await, Err(AuthError::MissingRefreshToken));
		assert_eq!(transport.calls(HttpMethod::Post, "/auth/refresh"), 0);
		assert!(coordinator.vault().get().is_none());
		assert_eq!(coordinator.refresh_if_expired().await, Ok(None));
	}
}
