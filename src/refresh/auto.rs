//! Background expiry checks.
//!
//! Mobile clients refresh a session shortly before it expires instead of waiting for the
//! first 401. [`spawn_auto_refresh`] runs that check on a fixed cadence and
//! [`TokenRefreshCoordinator::on_app_resumed`] runs it once when the app returns to the
//! foreground. Both go through the coordinator, so they never race a request-driven refresh.

// crates.io
use tokio::{
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::AuthError,
	http::ApiTransport,
	obs::{self, FlowKind},
	refresh::TokenRefreshCoordinator,
};

/// Handle to a running auto-refresh task; dropping it stops the task.
#[derive(Debug)]
pub struct AutoRefreshHandle {
	task: JoinHandle<()>,
}
impl AutoRefreshHandle {
	/// Stops the background task.
	pub fn stop(self) {
		drop(self);
	}

	/// Returns `true` once the task has exited.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}
impl Drop for AutoRefreshHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Spawns a task that refreshes the session every `interval` when it is close to expiry.
///
/// Must be called from within a Tokio runtime. Failures are logged; the coordinator has
/// already ended the session by then, so later ticks become no-ops until the user signs in
/// again.
pub fn spawn_auto_refresh<C>(
	coordinator: Arc<TokenRefreshCoordinator<C>>,
	interval: StdDuration,
) -> AutoRefreshHandle
where
	C: ?Sized + ApiTransport,
{
	let task = tokio::spawn(async move {
		let mut ticker = time::interval(interval);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// The first tick completes immediately.
		ticker.tick().await;

		loop {
			ticker.tick().await;

			if let Err(reason) = coordinator.refresh_if_expired().await {
				obs::warn_event(FlowKind::Refresh, "auto_refresh", &reason);
			}
		}
	});

	AutoRefreshHandle { task }
}

impl<C> TokenRefreshCoordinator<C>
where
	C: ?Sized + ApiTransport,
{
	/// Runs the expiry check after the app returns to the foreground.
	pub async fn on_app_resumed(&self) -> Result<Option<TokenSecret>, AuthError> {
		self.refresh_if_expired().await
	}
}
