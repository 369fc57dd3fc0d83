//! Keyed query cache with per-mutation snapshot tracking.
//!
//! Reads (`get`, `store_query`) behave like a plain map. Optimistic writes go through
//! [`QueryCache::begin`], which snapshots and overwrites every affected key inside one critical
//! section, and are settled later with [`QueryCache::commit`] or [`QueryCache::rollback`].
//!
//! Each key keeps its confirmed value (fetched data plus settled server answers) and the
//! ordered list of optimistic writes that have not settled yet. The visible value is always
//! the pending writes replayed, in order, over the confirmed value, so overlapping mutations
//! on one key never clobber each other:
//!
//! - A failure drops the write and replays the others; with no other writer the visible
//!   value is exactly what it was before the write.
//! - A success drops the write, folds the server answer into the confirmed value, and
//!   replays the others on top of it.
//! - Favorite lists merge entries by id, so every write on them settles independently. The
//!   other keys hold a single value, and a success there also retires every earlier writer;
//!   when those settle later they no longer find themselves in the list and leave the key
//!   untouched.

// self
use crate::{
	_prelude::*,
	mutation::favorite::{FavoriteKind, FavoriteListEntry},
	scoring::EngagementState,
};

/// Errors raised while computing optimistic values.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CacheError {
	/// A cache entry holds a value of a different shape than its key implies.
	#[error("Cache entry `{key}` holds an unexpected value.")]
	UnexpectedValue {
		/// Rendered cache key.
		key: String,
	},
	/// A favorite must be removed but its server id is not cached.
	#[error("No cached favorite id is known for {entity}.")]
	FavoriteIdUnknown {
		/// Rendered entity reference.
		entity: String,
	},
}

/// Identifies one cached query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
	/// Whether the user favorited an entity.
	FavoriteCheck {
		/// Entity type.
		kind: FavoriteKind,
		/// Entity id.
		entity_id: String,
	},
	/// A user's favorite list.
	FavoriteList {
		/// Owner of the list.
		user_id: String,
	},
	/// Engagement snapshot of an event.
	Engagement {
		/// Event id.
		event_id: String,
	},
}
impl CacheKey {
	/// Whether a later confirmed write makes earlier pending writes obsolete.
	fn is_last_writer_wins(&self) -> bool {
		!matches!(self, CacheKey::FavoriteList { .. })
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			CacheKey::FavoriteCheck { kind, entity_id } =>
				write!(f, "favorites/check/{kind}/{entity_id}"),
			CacheKey::FavoriteList { user_id } => write!(f, "favorites/user/{user_id}"),
			CacheKey::Engagement { event_id } => write!(f, "engagements/event/{event_id}"),
		}
	}
}

/// Value stored under a [`CacheKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
	/// Favorite check result.
	Flag(bool),
	/// Favorite list, newest first.
	Favorites(Vec<FavoriteListEntry>),
	/// Event engagement snapshot.
	Engagement(EngagementState),
}
impl CacheValue {
	/// Returns the flag, if this is one.
	pub fn as_flag(&self) -> Option<bool> {
		match self {
			CacheValue::Flag(flag) => Some(*flag),
			_ => None,
		}
	}

	/// Returns the favorite list, if this is one.
	pub fn as_favorites(&self) -> Option<&[FavoriteListEntry]> {
		match self {
			CacheValue::Favorites(entries) => Some(entries),
			_ => None,
		}
	}

	/// Returns the engagement snapshot, if this is one.
	pub fn as_engagement(&self) -> Option<&EngagementState> {
		match self {
			CacheValue::Engagement(state) => Some(state),
			_ => None,
		}
	}
}

/// Identifier of one optimistic mutation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);
impl Display for MutationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "m{}", self.0)
	}
}

/// Value a key held right before a mutation overwrote it.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationSnapshot {
	/// Overwritten key.
	pub key: CacheKey,
	/// Previous value; `None` means the key was absent.
	pub previous_value: Option<CacheValue>,
}

/// Receipt returned by [`QueryCache::begin`]; settle it exactly once.
#[derive(Debug)]
pub struct MutationTicket {
	id: MutationId,
	snapshots: Vec<MutationSnapshot>,
	untouched: Vec<CacheKey>,
}
impl MutationTicket {
	/// Mutation identifier.
	pub fn id(&self) -> MutationId {
		self.id
	}

	/// Snapshots of the keys this mutation overwrote.
	pub fn snapshots(&self) -> &[MutationSnapshot] {
		&self.snapshots
	}
}

/// Optimistic write kept per key until its mutation settles.
type Replay =
	Arc<dyn Fn(&CacheKey, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError> + Send + Sync>;

/// Shared keyed store for query results.
///
/// Callbacks passed to [`begin`](Self::begin) and [`commit`](Self::commit) run under the
/// cache lock and must not call back into the cache.
#[derive(Debug, Default)]
pub struct QueryCache {
	state: Mutex<CacheState>,
}
impl QueryCache {
	/// Returns the visible value under `key`.
	pub fn get(&self, key: &CacheKey) -> Option<CacheValue> {
		self.state.lock().entries.get(key).and_then(|entry| entry.value.clone())
	}

	/// Stores a fetched query result.
	///
	/// Skipped (returns `false`) while a mutation on `key` is pending, so fetched data never
	/// overwrites an optimistic value or the snapshot it will roll back to.
	pub fn store_query(&self, key: CacheKey, value: CacheValue) -> bool {
		let mut state = self.state.lock();
		let entry = state.entries.entry(key).or_default();

		if !entry.pending.is_empty() {
			return false;
		}

		entry.confirm(Some(value));

		true
	}

	/// Replaces the value under `key` with `update(current)`, unless a mutation on it is
	/// pending. Returning `None` drops the value.
	pub fn update_query<F>(&self, key: CacheKey, update: F) -> bool
	where
		F: FnOnce(Option<CacheValue>) -> Option<CacheValue>,
	{
		let mut state = self.state.lock();
		let entry = state.entries.entry(key).or_default();

		if !entry.pending.is_empty() {
			return false;
		}

		let next = update(entry.confirmed.take());

		entry.confirm(next);
		state.prune();

		true
	}

	/// Drops the value under `key` unless a mutation on it is pending.
	pub fn remove(&self, key: &CacheKey) -> bool {
		let mut state = self.state.lock();
		let Some(entry) = state.entries.get(key) else {
			return true;
		};

		if !entry.pending.is_empty() {
			return false;
		}

		state.entries.remove(key);

		true
	}

	/// Drops every value and forgets every pending mutation; later settlements are no-ops.
	pub fn clear(&self) {
		self.state.lock().entries.clear();
	}

	/// Number of unsettled mutations that wrote `key`.
	pub fn pending_count(&self, key: &CacheKey) -> usize {
		self.state.lock().entries.get(key).map_or(0, |entry| entry.pending.len())
	}

	/// Snapshots `keys` and writes the values `apply` computes, in one critical section.
	///
	/// `apply` receives each key's visible value and returns the value to write, or `None` to
	/// leave the key alone. If any call fails nothing is written. The cache keeps `apply` and
	/// replays it whenever an overlapping mutation on the same key settles first.
	pub fn begin<F>(&self, keys: &[CacheKey], apply: F) -> Result<MutationTicket, CacheError>
	where
		F: 'static
			+ Send
			+ Sync
			+ Fn(&CacheKey, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError>,
	{
		let apply: Replay = Arc::new(apply);
		let mut state = self.state.lock();
		let planned = keys
			.iter()
			.map(|key| {
				let current = state.entries.get(key).and_then(|entry| entry.value.as_ref());

				apply(key, current).map(|next| (key, next))
			})
			.collect::<Result<Vec<_>, _>>()?;

		state.next_id += 1;

		let id = MutationId(state.next_id);
		let mut snapshots = Vec::new();
		let mut untouched = Vec::new();

		for (key, next) in planned {
			let Some(next) = next else {
				untouched.push(key.clone());

				continue;
			};
			let entry = state.entries.entry(key.clone()).or_default();
			let previous_value = entry.value.replace(next);

			entry.pending.push(PendingWrite { mutation: id, replay: apply.clone() });
			snapshots.push(MutationSnapshot { key: key.clone(), previous_value });
		}

		Ok(MutationTicket { id, snapshots, untouched })
	}

	/// Settles a successful mutation.
	///
	/// `reconcile` maps a key's confirmed value, which never contains pending optimistic
	/// writes, to server truth; `None` keeps the value as is. Keys the mutation left alone are
	/// reconciled too when no other mutation is pending on them.
	pub fn commit<F>(&self, ticket: MutationTicket, mut reconcile: F)
	where
		F: FnMut(&CacheKey, Option<&CacheValue>) -> Option<CacheValue>,
	{
		let mut state = self.state.lock();

		for snapshot in &ticket.snapshots {
			let Some(entry) = state.entries.get_mut(&snapshot.key) else {
				continue;
			};
			let Some(position) = entry.position_of(ticket.id) else {
				continue;
			};

			if snapshot.key.is_last_writer_wins() {
				entry.pending.drain(..=position);
			} else {
				entry.pending.remove(position);
			}
			if let Some(next) = reconcile(&snapshot.key, entry.confirmed.as_ref()) {
				entry.confirmed = Some(next);
			}

			entry.replay(&snapshot.key);
		}
		for key in &ticket.untouched {
			let entry = state.entries.entry(key.clone()).or_default();

			if entry.pending.is_empty()
				&& let Some(next) = reconcile(key, entry.confirmed.as_ref())
			{
				entry.confirm(Some(next));
			}
		}

		state.prune();
	}

	/// Settles a failed mutation, removing its optimistic writes.
	pub fn rollback(&self, ticket: MutationTicket) {
		let mut state = self.state.lock();

		for snapshot in &ticket.snapshots {
			let Some(entry) = state.entries.get_mut(&snapshot.key) else {
				continue;
			};
			let Some(position) = entry.position_of(ticket.id) else {
				continue;
			};

			entry.pending.remove(position);
			entry.replay(&snapshot.key);
		}

		state.prune();
	}
}

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<CacheKey, Entry>,
	next_id: u64,
}
impl CacheState {
	fn prune(&mut self) {
		self.entries.retain(|_, entry| {
			entry.value.is_some() || entry.confirmed.is_some() || !entry.pending.is_empty()
		});
	}
}

#[derive(Debug, Default)]
struct Entry {
	/// Visible value: `pending` replayed over `confirmed`.
	value: Option<CacheValue>,
	confirmed: Option<CacheValue>,
	pending: Vec<PendingWrite>,
}
impl Entry {
	fn position_of(&self, mutation: MutationId) -> Option<usize> {
		self.pending.iter().position(|write| write.mutation == mutation)
	}

	/// Sets the confirmed value of an entry without pending writes.
	fn confirm(&mut self, value: Option<CacheValue>) {
		self.confirmed = value;
		self.value = self.confirmed.clone();
	}

	fn replay(&mut self, key: &CacheKey) {
		// A write that no longer applies to the new base (`None` or a shape error) is skipped.
		self.value = self.pending.iter().fold(self.confirmed.clone(), |value, write| {
			match (write.replay)(key, value.as_ref()) {
				Ok(Some(next)) => Some(next),
				Ok(None) | Err(_) => value,
			}
		});
	}
}

struct PendingWrite {
	mutation: MutationId,
	replay: Replay,
}
impl Debug for PendingWrite {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingWrite").field("mutation", &self.mutation).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::scoring::{EngagementCounts, EngagementType};

	#[derive(Clone, Copy, Debug)]
	enum Settle {
		Commit,
		Rollback,
	}

	fn key() -> CacheKey {
		CacheKey::FavoriteCheck { kind: FavoriteKind::Event, entity_id: "e1".into() }
	}

	fn set_flag(
		flag: bool,
	) -> impl 'static
	+ Send
	+ Sync
	+ Fn(&CacheKey, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError> {
		move |_, _| Ok(Some(CacheValue::Flag(flag)))
	}

	#[test]
	fn rollback_restores_the_exact_snapshot() {
		let cache = QueryCache::default();
		let absent = CacheKey::Engagement { event_id: "e1".into() };

		cache.store_query(key(), CacheValue::Flag(false));

		let ticket = cache
			.begin(&[key(), absent.clone()], set_flag(true))
			.expect("Optimistic apply should succeed.");

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(true)));
		assert_eq!(ticket.snapshots()[1].previous_value, None);
		assert!(!cache.store_query(key(), CacheValue::Flag(false)));

		cache.rollback(ticket);

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
		assert_eq!(cache.get(&absent), None);
		assert_eq!(cache.pending_count(&key()), 0);
	}

	#[test]
	fn failed_apply_writes_nothing() {
		let cache = QueryCache::default();
		let list = CacheKey::FavoriteList { user_id: "u1".into() };

		cache.store_query(key(), CacheValue::Flag(false));

		let err = cache
			.begin(&[key(), list.clone()], |key, _| match key {
				CacheKey::FavoriteCheck { .. } => Ok(Some(CacheValue::Flag(true))),
				other => Err(CacheError::UnexpectedValue { key: other.to_string() }),
			})
			.expect_err("Apply failure should abort.");

		assert_eq!(err, CacheError::UnexpectedValue { key: "favorites/user/u1".into() });
		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
		assert_eq!(cache.pending_count(&key()), 0);
	}

	#[test]
	fn earlier_rollback_never_clobbers_a_later_success() {
		let cache = QueryCache::default();

		cache.store_query(key(), CacheValue::Flag(false));

		let first = cache.begin(&[key()], set_flag(true)).expect("First apply should succeed.");
		let second = cache.begin(&[key()], set_flag(false)).expect("Second apply should succeed.");

		cache.commit(second, |_, _| Some(CacheValue::Flag(false)));
		cache.rollback(first);

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
		assert_eq!(cache.pending_count(&key()), 0);
	}

	#[test]
	fn buried_rollback_replays_later_writers() {
		let cache = QueryCache::default();

		cache.store_query(key(), CacheValue::Flag(false));

		let first = cache.begin(&[key()], set_flag(true)).expect("First apply should succeed.");
		let second = cache.begin(&[key()], set_flag(false)).expect("Second apply should succeed.");

		cache.rollback(first);

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
		assert_eq!(cache.pending_count(&key()), 1);

		cache.rollback(second);

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
	}

	#[test]
	fn buried_success_becomes_the_base_of_later_writers() {
		let cache = QueryCache::default();

		cache.store_query(key(), CacheValue::Flag(false));

		let first = cache.begin(&[key()], set_flag(true)).expect("First apply should succeed.");
		let second = cache.begin(&[key()], set_flag(true)).expect("Second apply should succeed.");

		// First settles with server truth `false`; second then fails and must fall back to it.
		cache.commit(first, |_, _| Some(CacheValue::Flag(false)));

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(true)));

		cache.rollback(second);

		assert_eq!(cache.get(&key()), Some(CacheValue::Flag(false)));
	}

	#[test]
	fn commit_seeds_untouched_keys_and_clear_orphans_tickets() {
		let cache = QueryCache::default();
		let engagement = CacheKey::Engagement { event_id: "e1".into() };
		let ticket =
			cache.begin(&[engagement.clone()], |_, _| Ok(None)).expect("No-op apply should succeed.");

		assert!(ticket.snapshots().is_empty());

		cache.commit(ticket, |_, _| Some(CacheValue::Flag(true)));

		assert_eq!(cache.get(&engagement), Some(CacheValue::Flag(true)));

		let ticket = cache.begin(&[key()], set_flag(true)).expect("Apply should succeed.");

		cache.clear();
		cache.rollback(ticket);

		assert_eq!(cache.get(&key()), None);
	}

	fn favorite(id: &str) -> FavoriteListEntry {
		FavoriteListEntry {
			id: id.into(),
			user_id: "u1".into(),
			establishment_id: None,
			event_id: Some(format!("event-{id}")),
			created_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	fn listed(value: Option<&CacheValue>) -> Vec<FavoriteListEntry> {
		value.and_then(CacheValue::as_favorites).map(<[_]>::to_vec).unwrap_or_default()
	}

	fn listed_ids(cache: &QueryCache, key: &CacheKey) -> Vec<String> {
		listed(cache.get(key).as_ref()).into_iter().map(|entry| entry.id).collect()
	}

	fn prepend(
		id: &'static str,
	) -> impl 'static
	+ Send
	+ Sync
	+ Fn(&CacheKey, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError> {
		move |_, current| {
			let mut entries = listed(current);

			entries.insert(0, favorite(id));

			Ok(Some(CacheValue::Favorites(entries)))
		}
	}

	fn engagement(counts: [u32; 4], vote: Option<EngagementType>) -> CacheValue {
		let [envie, grande_envie, decouvrir, pas_envie] = counts;

		CacheValue::Engagement(EngagementState::from_counts(
			EngagementCounts { envie, grande_envie, decouvrir, pas_envie },
			vote,
		))
	}

	fn vote(
		kind: EngagementType,
	) -> impl 'static
	+ Send
	+ Sync
	+ Fn(&CacheKey, Option<&CacheValue>) -> Result<Option<CacheValue>, CacheError> {
		move |key, current| match current {
			Some(CacheValue::Engagement(state)) =>
				Ok(Some(CacheValue::Engagement(state.with_vote(kind)))),
			_ => Err(CacheError::UnexpectedValue { key: key.to_string() }),
		}
	}

	#[test]
	fn overlapping_list_writes_settle_in_any_order() {
		let list = CacheKey::FavoriteList { user_id: "u1".into() };
		let cases: [([(usize, Settle); 2], &[&str]); 6] = [
			([(0, Settle::Commit), (1, Settle::Commit)], &["fav-b", "fav-a", "fav-0"]),
			([(1, Settle::Commit), (0, Settle::Commit)], &["fav-a", "fav-b", "fav-0"]),
			([(0, Settle::Rollback), (1, Settle::Commit)], &["fav-b", "fav-0"]),
			([(1, Settle::Commit), (0, Settle::Rollback)], &["fav-b", "fav-0"]),
			([(0, Settle::Commit), (1, Settle::Rollback)], &["fav-a", "fav-0"]),
			([(1, Settle::Rollback), (0, Settle::Rollback)], &["fav-0"]),
		];

		for (order, expected) in cases {
			let cache = QueryCache::default();

			cache.store_query(list.clone(), CacheValue::Favorites(vec![favorite("fav-0")]));

			let first = cache.begin(&[list.clone()], prepend("optimistic-a"));
			let second = cache.begin(&[list.clone()], prepend("optimistic-b"));
			let mut tickets = [
				Some(first.expect("First apply should succeed.")),
				Some(second.expect("Second apply should succeed.")),
			];

			assert_eq!(listed_ids(&cache, &list), ["optimistic-b", "optimistic-a", "fav-0"]);

			for (index, settle) in order {
				let ticket = tickets[index].take().expect("Each ticket should settle once.");
				let server_id = if index == 0 { "fav-a" } else { "fav-b" };

				match settle {
					Settle::Commit => cache.commit(ticket, |_, confirmed| {
						let mut entries = listed(confirmed);

						entries.insert(0, favorite(server_id));

						Some(CacheValue::Favorites(entries))
					}),
					Settle::Rollback => cache.rollback(ticket),
				}
			}

			assert_eq!(listed_ids(&cache, &list), expected, "Settle order {order:?}.");
			assert_eq!(cache.pending_count(&list), 0);
		}
	}

	#[test]
	fn list_shows_later_placeholders_over_a_settled_earlier_write() {
		let cache = QueryCache::default();
		let list = CacheKey::FavoriteList { user_id: "u1".into() };

		cache.store_query(list.clone(), CacheValue::Favorites(vec![favorite("fav-0")]));

		let first =
			cache.begin(&[list.clone()], prepend("optimistic-a")).expect("First apply should succeed.");
		let second =
			cache.begin(&[list.clone()], prepend("optimistic-b")).expect("Second apply should succeed.");

		cache.rollback(first);

		assert_eq!(listed_ids(&cache, &list), ["optimistic-b", "fav-0"]);

		cache.commit(second, |_, confirmed| {
			let mut entries = listed(confirmed);

			entries.insert(0, favorite("fav-b"));

			Some(CacheValue::Favorites(entries))
		});

		assert_eq!(listed_ids(&cache, &list), ["fav-b", "fav-0"]);
	}

	#[test]
	fn overlapping_votes_settle_in_any_order() {
		let key = CacheKey::Engagement { event_id: "e1".into() };
		let fetched = engagement([5, 0, 0, 0], Some(EngagementType::Envie));
		let server_a = engagement([4, 6, 0, 0], Some(EngagementType::GrandeEnvie));
		let server_b = engagement([3, 5, 0, 2], Some(EngagementType::PasEnvie));
		let optimistic_a = engagement([4, 1, 0, 0], Some(EngagementType::GrandeEnvie));
		let optimistic_b = engagement([4, 0, 0, 1], Some(EngagementType::PasEnvie));
		let b_over_server_a = engagement([4, 5, 0, 1], Some(EngagementType::PasEnvie));
		let cases = [
			([(0, Settle::Commit), (1, Settle::Commit)], server_b.clone()),
			([(1, Settle::Commit), (0, Settle::Commit)], server_b.clone()),
			([(0, Settle::Rollback), (1, Settle::Commit)], server_b.clone()),
			([(1, Settle::Commit), (0, Settle::Rollback)], server_b.clone()),
			([(0, Settle::Commit), (1, Settle::Rollback)], server_a.clone()),
			([(1, Settle::Rollback), (0, Settle::Commit)], server_a.clone()),
			([(0, Settle::Rollback), (1, Settle::Rollback)], fetched.clone()),
			([(1, Settle::Rollback), (0, Settle::Rollback)], fetched.clone()),
		];

		for (order, expected) in cases {
			let cache = QueryCache::default();

			cache.store_query(key.clone(), fetched.clone());

			let mut tickets = [
				Some(
					cache
						.begin(&[key.clone()], vote(EngagementType::GrandeEnvie))
						.expect("Apply should succeed."),
				),
				Some(
					cache
						.begin(&[key.clone()], vote(EngagementType::PasEnvie))
						.expect("Apply should succeed."),
				),
			];

			assert_eq!(cache.get(&key), Some(optimistic_b.clone()));

			for (step, (index, settle)) in order.into_iter().enumerate() {
				let ticket = tickets[index].take().expect("Each ticket should settle once.");
				let server = if index == 0 { server_a.clone() } else { server_b.clone() };

				match settle {
					Settle::Commit => cache.commit(ticket, |_, _| Some(server.clone())),
					Settle::Rollback => cache.rollback(ticket),
				}

				if step == 0 {
					let visible = match (index, settle) {
						(0, Settle::Commit) => b_over_server_a.clone(),
						(0, Settle::Rollback) => optimistic_b.clone(),
						(_, Settle::Commit) => server_b.clone(),
						(_, Settle::Rollback) => optimistic_a.clone(),
					};

					assert_eq!(cache.get(&key), Some(visible), "First settle of {order:?}.");
				}
			}

			assert_eq!(cache.get(&key), Some(expected), "Settle order {order:?}.");
			assert_eq!(cache.pending_count(&key), 0);
		}
	}
}
