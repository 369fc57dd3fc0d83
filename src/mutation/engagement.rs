//! Event engagement voting.
//!
//! The optimistic value is the cached snapshot with the user's vote moved to the new kind,
//! scored locally. The server's snapshot replaces it on success. Nothing is written when no
//! snapshot is cached yet.

// self
use crate::{
	_prelude::*,
	cache::{CacheError, CacheKey, CacheValue},
	client::ApiClient,
	http::ApiTransport,
	mutation::{MutationEngine, MutationFuture, OptimisticMutation, unexpected},
	scoring::{EngagementState, EngagementType},
};

/// Engagement vote on one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngagementMutation {
	/// Event being voted on.
	pub event_id: String,
}
impl EngagementMutation {
	fn key(&self) -> CacheKey {
		CacheKey::Engagement { event_id: self.event_id.clone() }
	}
}
impl OptimisticMutation for EngagementMutation {
	type Intent = EngagementType;
	type Output = EngagementState;

	const LABEL: &'static str = "engagement";

	fn keys(&self, _intent: &EngagementType) -> Vec<CacheKey> {
		vec![self.key()]
	}

	fn apply(
		&self,
		key: &CacheKey,
		current: Option<&CacheValue>,
		intent: &EngagementType,
	) -> Result<Option<CacheValue>, CacheError> {
		match current {
			None => Ok(None),
			Some(CacheValue::Engagement(state)) =>
				Ok(Some(CacheValue::Engagement(state.with_vote(*intent)))),
			Some(_) => Err(unexpected(key)),
		}
	}

	fn remote<'a, C>(
		&'a self,
		client: &'a ApiClient<C>,
		intent: &'a EngagementType,
	) -> MutationFuture<'a, EngagementState>
	where
		C: ?Sized + ApiTransport,
	{
		#[derive(Serialize)]
		struct EngageBody {
			r#type: EngagementType,
		}

		Box::pin(async move {
			client
				.post_json(
					["events", self.event_id.as_str(), "engage"],
					&EngageBody { r#type: *intent },
					"event engagement",
				)
				.await
		})
	}

	fn reconcile(
		&self,
		_key: &CacheKey,
		_current: Option<&CacheValue>,
		_intent: &EngagementType,
		output: &EngagementState,
	) -> Option<CacheValue> {
		Some(CacheValue::Engagement(output.clone()))
	}
}

impl<C> MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	/// Cached engagement snapshot of `event_id`, if any.
	pub fn cached_engagement(&self, event_id: &str) -> Option<EngagementState> {
		self.cache()
			.get(&CacheKey::Engagement { event_id: event_id.into() })
			.and_then(|value| value.as_engagement().cloned())
	}

	/// Votes `kind` on `event_id` and returns the server's snapshot.
	pub async fn engage_event(
		&self,
		event_id: impl Into<String>,
		kind: EngagementType,
	) -> Result<EngagementState> {
		self.run(&EngagementMutation { event_id: event_id.into() }, kind).await
	}

	/// Fetches the engagement snapshot of `event_id` and caches it.
	pub async fn fetch_engagement(&self, event_id: &str) -> Result<EngagementState> {
		let state: EngagementState =
			self.client().get_json(["events", event_id, "engagement"], "event engagement").await?;

		self.cache()
			.store_query(CacheKey::Engagement { event_id: event_id.into() }, CacheValue::Engagement(state.clone()));

		Ok(state)
	}
}
