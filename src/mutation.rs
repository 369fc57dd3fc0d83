//! Optimistic mutations with exact rollback.
//!
//! A mutation is described by an [`OptimisticMutation`] implementation: which cache keys it
//! touches, the optimistic value for each, the remote call, and how server truth replaces the
//! optimistic value. [`MutationEngine::run`] drives the protocol:
//!
//! 1. Snapshot every affected key and write the optimistic values in one critical section.
//! 2. Send the remote call through the [`ApiClient`].
//! 3. On success, reconcile the cache with the server's answer.
//! 4. On any failure, restore the snapshots and return the original error.
//!
//! While a mutation is pending, the cache keeps a copy of it and replays its optimistic write
//! whenever an overlapping mutation on the same key settles first.
//!
//! If the future returned by `run` is dropped mid-flight, the mutation is rolled back as if it
//! had failed.

pub mod engagement;
pub mod favorite;

pub use engagement::*;
pub use favorite::*;

// self
use crate::{
	_prelude::*,
	cache::{CacheError, CacheKey, CacheValue, MutationTicket, QueryCache},
	client::ApiClient,
	http::ApiTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Boxed future returned by [`OptimisticMutation::remote`].
pub type MutationFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Describes one kind of optimistic mutation.
pub trait OptimisticMutation
where
	Self: 'static + Clone + Send + Sync,
{
	/// What the user asked for.
	type Intent: 'static + Clone + Send + Sync;
	/// What the server answered.
	type Output: Send + Sync;

	/// Label used for spans and logs.
	const LABEL: &'static str;

	/// Cache keys the mutation may write.
	fn keys(&self, intent: &Self::Intent) -> Vec<CacheKey>;

	/// Optimistic value for `key` given its visible value; `None` leaves the key alone.
	///
	/// Runs under the cache lock and may run again over a newer base value, so it must be
	/// pure.
	fn apply(
		&self,
		key: &CacheKey,
		current: Option<&CacheValue>,
		intent: &Self::Intent,
	) -> Result<Option<CacheValue>, CacheError>;

	/// Sends the mutation to the server.
	fn remote<'a, C>(
		&'a self,
		client: &'a ApiClient<C>,
		intent: &'a Self::Intent,
	) -> MutationFuture<'a, Self::Output>
	where
		C: ?Sized + ApiTransport;

	/// Server-truth value for `key`, given its confirmed value; `None` keeps that value.
	///
	/// The confirmed value never contains pending optimistic writes, so placeholders written
	/// by [`apply`](Self::apply) are not visible here.
	fn reconcile(
		&self,
		key: &CacheKey,
		current: Option<&CacheValue>,
		intent: &Self::Intent,
		output: &Self::Output,
	) -> Option<CacheValue>;
}

/// Runs optimistic mutations against a shared [`QueryCache`].
pub struct MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	client: ApiClient<C>,
	cache: Arc<QueryCache>,
}
impl<C> MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	/// Creates an engine writing into `cache` and calling the API through `client`.
	pub fn new(client: ApiClient<C>, cache: Arc<QueryCache>) -> Self {
		Self { client, cache }
	}

	/// Returns the API client.
	pub fn client(&self) -> &ApiClient<C> {
		&self.client
	}

	/// Returns the shared cache.
	pub fn cache(&self) -> &Arc<QueryCache> {
		&self.cache
	}

	/// Applies `intent` optimistically, calls the server, then reconciles or rolls back.
	pub async fn run<M>(&self, mutation: &M, intent: M::Intent) -> Result<M::Output>
	where
		M: OptimisticMutation,
	{
		const KIND: FlowKind = FlowKind::Mutation;

		let span = FlowSpan::new(KIND, M::LABEL);
		let keys = mutation.keys(&intent);
		let (replayed, replayed_intent) = (mutation.clone(), intent.clone());
		let ticket = self
			.cache
			.begin(&keys, move |key, current| replayed.apply(key, current, &replayed_intent))
			.inspect_err(|_| span.settle(FlowOutcome::Failure))?;
		let mut pending = PendingTicket { cache: &self.cache, label: M::LABEL, ticket: Some(ticket) };
		let result = span.instrument(mutation.remote(&self.client, &intent)).await;

		match result {
			Ok(output) => {
				if let Some(ticket) = pending.ticket.take() {
					self.cache.commit(ticket, |key, current| {
						mutation.reconcile(key, current, &intent, &output)
					});
				}

				span.settle(FlowOutcome::Success);

				Ok(output)
			},
			Err(e) => {
				pending.roll_back();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				span.settle(FlowOutcome::RolledBack);
				obs::warn_event(KIND, M::LABEL, &e);

				Err(e)
			},
		}
	}
}
impl<C> Clone for MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone(), cache: self.cache.clone() }
	}
}
impl<C> Debug for MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MutationEngine").field("client", &self.client).finish_non_exhaustive()
	}
}

/// Rolls the mutation back unless it was settled.
struct PendingTicket<'a> {
	cache: &'a QueryCache,
	label: &'static str,
	ticket: Option<MutationTicket>,
}
impl PendingTicket<'_> {
	fn roll_back(&mut self) {
		if let Some(ticket) = self.ticket.take() {
			obs::record_rolled_back_keys(self.label, ticket.snapshots().len());
			self.cache.rollback(ticket);
		}
	}
}
impl Drop for PendingTicket<'_> {
	fn drop(&mut self) {
		self.roll_back();
	}
}

fn unexpected(key: &CacheKey) -> CacheError {
	CacheError::UnexpectedValue { key: key.to_string() }
}
