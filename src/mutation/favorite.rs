//! Favorite toggling.
//!
//! A favorite mutation writes two cache entries: the check flag of the target and the
//! user's favorite list. Adding prepends a placeholder entry carrying a temporary
//! `optimistic-…` id that reconciliation swaps for the server's entry; removing drops the
//! entry by id.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	cache::{CacheError, CacheKey, CacheValue},
	client::{ApiClient, Page, PageRequest},
	http::ApiTransport,
	mutation::{MutationEngine, MutationFuture, OptimisticMutation, unexpected},
};

/// Prefix of temporary ids given to optimistic favorite entries.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Kind of entity that can be favorited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
	/// A venue.
	Establishment,
	/// An event.
	Event,
}
impl FavoriteKind {
	/// Wire name used in endpoint paths.
	pub const fn as_str(self) -> &'static str {
		match self {
			FavoriteKind::Establishment => "establishment",
			FavoriteKind::Event => "event",
		}
	}
}
impl Display for FavoriteKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Entity a favorite points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FavoriteTarget {
	/// A venue id.
	Establishment(String),
	/// An event id.
	Event(String),
}
impl FavoriteTarget {
	/// Entity kind.
	pub fn kind(&self) -> FavoriteKind {
		match self {
			FavoriteTarget::Establishment(_) => FavoriteKind::Establishment,
			FavoriteTarget::Event(_) => FavoriteKind::Event,
		}
	}

	/// Entity id.
	pub fn id(&self) -> &str {
		match self {
			FavoriteTarget::Establishment(id) | FavoriteTarget::Event(id) => id,
		}
	}

	/// Cache key of the target's check flag.
	pub fn check_key(&self) -> CacheKey {
		CacheKey::FavoriteCheck { kind: self.kind(), entity_id: self.id().into() }
	}

	/// Returns `true` if `entry` favorites this target.
	pub fn matches(&self, entry: &FavoriteListEntry) -> bool {
		entry.target().as_ref() == Some(self)
	}
}
impl Display for FavoriteTarget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}", self.kind(), self.id())
	}
}

/// One favorite as listed by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteListEntry {
	/// Favorite id; temporary while optimistic.
	pub id: String,
	/// Owner.
	pub user_id: String,
	/// Favorited venue, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub establishment_id: Option<String>,
	/// Favorited event, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub event_id: Option<String>,
	/// Creation time.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl FavoriteListEntry {
	/// Builds a placeholder entry for `target` with a fresh temporary id.
	pub fn optimistic(user_id: impl Into<String>, target: &FavoriteTarget) -> Self {
		Self::placeholder(optimistic_id(), user_id, target)
	}

	fn placeholder(id: String, user_id: impl Into<String>, target: &FavoriteTarget) -> Self {
		let (establishment_id, event_id) = match target {
			FavoriteTarget::Establishment(entity) => (Some(entity.clone()), None),
			FavoriteTarget::Event(entity) => (None, Some(entity.clone())),
		};

		Self {
			id,
			user_id: user_id.into(),
			establishment_id,
			event_id,
			created_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns `true` for placeholder entries not yet confirmed by the server.
	pub fn is_optimistic(&self) -> bool {
		self.id.starts_with(OPTIMISTIC_ID_PREFIX)
	}

	/// Favorited entity; the event wins if both ids are set.
	pub fn target(&self) -> Option<FavoriteTarget> {
		match (&self.event_id, &self.establishment_id) {
			(Some(id), _) => Some(FavoriteTarget::Event(id.clone())),
			(None, Some(id)) => Some(FavoriteTarget::Establishment(id.clone())),
			(None, None) => None,
		}
	}
}

/// Generates a fresh temporary favorite id.
pub fn optimistic_id() -> String {
	let suffix: u64 = rand::rng().random();

	format!("{OPTIMISTIC_ID_PREFIX}{suffix:016x}")
}

/// What a favorite mutation should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FavoriteIntent {
	/// Favorite the target; `optimistic_id` names the placeholder entry.
	Add {
		/// Temporary id of the placeholder entry.
		optimistic_id: String,
	},
	/// Unfavorite the target.
	Remove {
		/// Server id of the favorite to delete.
		favorite_id: String,
	},
}

/// Server answer to a favorite mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FavoriteOutcome {
	/// The favorite was created.
	Added(FavoriteListEntry),
	/// The favorite was deleted.
	Removed {
		/// Deleted favorite id.
		favorite_id: String,
	},
}
impl FavoriteOutcome {
	/// Favorite state after the mutation.
	pub fn is_favorite(&self) -> bool {
		matches!(self, FavoriteOutcome::Added(_))
	}
}

/// Favorite mutation for one user and target.
#[derive(Clone, Debug)]
pub struct FavoriteMutation {
	/// Owner of the favorite list.
	pub user_id: String,
	/// Entity being (un)favorited.
	pub target: FavoriteTarget,
}
impl FavoriteMutation {
	fn list_key(&self) -> CacheKey {
		CacheKey::FavoriteList { user_id: self.user_id.clone() }
	}
}
impl OptimisticMutation for FavoriteMutation {
	type Intent = FavoriteIntent;
	type Output = FavoriteOutcome;

	const LABEL: &'static str = "favorite";

	fn keys(&self, _intent: &FavoriteIntent) -> Vec<CacheKey> {
		vec![self.target.check_key(), self.list_key()]
	}

	fn apply(
		&self,
		key: &CacheKey,
		current: Option<&CacheValue>,
		intent: &FavoriteIntent,
	) -> Result<Option<CacheValue>, CacheError> {
		match key {
			CacheKey::FavoriteCheck { .. } => match current {
				None | Some(CacheValue::Flag(_)) =>
					Ok(Some(CacheValue::Flag(matches!(intent, FavoriteIntent::Add { .. })))),
				Some(_) => Err(unexpected(key)),
			},
			CacheKey::FavoriteList { .. } => {
				let Some(current) = current else {
					return Ok(None);
				};
				let entries = current.as_favorites().ok_or_else(|| unexpected(key))?;

				match intent {
					FavoriteIntent::Add { .. } if entries.iter().any(|e| self.target.matches(e)) =>
						Ok(None),
					FavoriteIntent::Add { optimistic_id } => {
						let placeholder = FavoriteListEntry::placeholder(
							optimistic_id.clone(),
							&self.user_id,
							&self.target,
						);
						let mut next = Vec::with_capacity(entries.len() + 1);

						next.push(placeholder);
						next.extend_from_slice(entries);

						Ok(Some(CacheValue::Favorites(next)))
					},
					FavoriteIntent::Remove { favorite_id } => Ok(Some(CacheValue::Favorites(
						entries.iter().filter(|e| &e.id != favorite_id).cloned().collect(),
					))),
				}
			},
			CacheKey::Engagement { .. } => Ok(None),
		}
	}

	fn remote<'a, C>(
		&'a self,
		client: &'a ApiClient<C>,
		intent: &'a FavoriteIntent,
	) -> MutationFuture<'a, FavoriteOutcome>
	where
		C: ?Sized + ApiTransport,
	{
		#[derive(Serialize)]
		#[serde(rename_all = "camelCase")]
		struct AddBody<'a> {
			#[serde(skip_serializing_if = "Option::is_none")]
			establishment_id: Option<&'a str>,
			#[serde(skip_serializing_if = "Option::is_none")]
			event_id: Option<&'a str>,
		}

		Box::pin(async move {
			match intent {
				FavoriteIntent::Add { .. } => {
					let body = match &self.target {
						FavoriteTarget::Establishment(id) =>
							AddBody { establishment_id: Some(id.as_str()), event_id: None },
						FavoriteTarget::Event(id) =>
							AddBody { establishment_id: None, event_id: Some(id.as_str()) },
					};
					let entry = client.post_json(["favorites"], &body, "favorite add").await?;

					Ok(FavoriteOutcome::Added(entry))
				},
				FavoriteIntent::Remove { favorite_id } => {
					client.delete(["favorites", favorite_id.as_str()]).await?;

					Ok(FavoriteOutcome::Removed { favorite_id: favorite_id.clone() })
				},
			}
		})
	}

	fn reconcile(
		&self,
		key: &CacheKey,
		current: Option<&CacheValue>,
		_intent: &FavoriteIntent,
		output: &FavoriteOutcome,
	) -> Option<CacheValue> {
		match key {
			CacheKey::FavoriteCheck { .. } => Some(CacheValue::Flag(output.is_favorite())),
			CacheKey::FavoriteList { .. } => {
				let entries = current?.as_favorites()?;

				match output {
					FavoriteOutcome::Added(entry) => {
						let mut next = entries.to_vec();

						match next.iter().position(|e| e.id == entry.id || self.target.matches(e)) {
							Some(position) => next[position] = entry.clone(),
							None => next.insert(0, entry.clone()),
						}

						Some(CacheValue::Favorites(next))
					},
					FavoriteOutcome::Removed { favorite_id } => {
						entries.iter().any(|e| &e.id == favorite_id).then(|| {
							CacheValue::Favorites(
								entries.iter().filter(|e| &e.id != favorite_id).cloned().collect(),
							)
						})
					},
					_ => None,
				}
			},
			CacheKey::Engagement { .. } => None,
		}
	}
}

impl<C> MutationEngine<C>
where
	C: ?Sized + ApiTransport,
{
	/// Cached favorite flag of `target`, if fetched or mutated before.
	pub fn is_favorite(&self, target: &FavoriteTarget) -> Option<bool> {
		self.cache().get(&target.check_key()).and_then(|value| value.as_flag())
	}

	/// Favorites `target` for `user_id`.
	pub async fn add_favorite(
		&self,
		user_id: impl Into<String>,
		target: FavoriteTarget,
	) -> Result<FavoriteListEntry> {
		let mutation = FavoriteMutation { user_id: user_id.into(), target };
		let intent = FavoriteIntent::Add { optimistic_id: optimistic_id() };

		match self.run(&mutation, intent).await? {
			FavoriteOutcome::Added(entry) => Ok(entry),
			FavoriteOutcome::Removed { .. } =>
				Err(CacheError::UnexpectedValue { key: mutation.list_key().to_string() }.into()),
		}
	}

	/// Deletes favorite `favorite_id`, which points at `target`.
	pub async fn remove_favorite(
		&self,
		user_id: impl Into<String>,
		target: FavoriteTarget,
		favorite_id: impl Into<String>,
	) -> Result<()> {
		let mutation = FavoriteMutation { user_id: user_id.into(), target };

		self.run(&mutation, FavoriteIntent::Remove { favorite_id: favorite_id.into() }).await?;

		Ok(())
	}

	/// Flips the favorite state of `target` and returns the new state.
	///
	/// The current state comes from the cached check flag (absent means "not a favorite"); the
	/// favorite id to delete comes from the cached list.
	pub async fn toggle_favorite(
		&self,
		user_id: impl Into<String>,
		target: FavoriteTarget,
	) -> Result<bool> {
		let user_id = user_id.into();

		if !self.is_favorite(&target).unwrap_or(false) {
			self.add_favorite(user_id, target).await?;

			return Ok(true);
		}

		let list_key = CacheKey::FavoriteList { user_id: user_id.clone() };
		let favorite_id = self
			.cache()
			.get(&list_key)
			.as_ref()
			.and_then(|value| value.as_favorites())
			.and_then(|entries| entries.iter().find(|e| target.matches(e) && !e.is_optimistic()))
			.map(|entry| entry.id.clone())
			.ok_or_else(|| CacheError::FavoriteIdUnknown { entity: target.to_string() })?;

		self.remove_favorite(user_id, target, favorite_id).await?;

		Ok(false)
	}

	/// Fetches the favorite flag of `target` and caches it.
	pub async fn check_favorite(&self, target: &FavoriteTarget) -> Result<bool> {
		#[derive(Deserialize)]
		#[serde(rename_all = "camelCase")]
		struct CheckBody {
			is_favorite: bool,
		}

		let body: CheckBody = self
			.client()
			.get_json(["favorites", "check", target.kind().as_str(), target.id()], "favorite check")
			.await?;

		self.cache().store_query(target.check_key(), CacheValue::Flag(body.is_favorite));

		Ok(body.is_favorite)
	}

	/// Fetches one page of `user_id`'s favorites and merges it into the cache.
	///
	/// The first page replaces the cached list; later pages are appended. Every listed target
	/// is also cached as favorited.
	pub async fn fetch_favorites(
		&self,
		user_id: &str,
		page: PageRequest,
	) -> Result<Page<FavoriteListEntry>> {
		let mut url = self.client().endpoint(["users", user_id, "favorites"])?;

		url.query_pairs_mut()
			.append_pair("page", &page.page.to_string())
			.append_pair("limit", &page.limit.to_string());

		let fetched: Page<FavoriteListEntry> =
			self.client().get_json_url(url, "favorite list").await?;
		let list_key = CacheKey::FavoriteList { user_id: user_id.into() };

		self.cache().update_query(list_key, |current| {
			let mut entries = match (page.page, current) {
				(0 | 1, _) | (_, None) => Vec::new(),
				(_, Some(CacheValue::Favorites(entries))) => entries,
				(_, Some(other)) => return Some(other),
			};

			for entry in &fetched.data {
				if !entries.iter().any(|e| e.id == entry.id) {
					entries.push(entry.clone());
				}
			}

			Some(CacheValue::Favorites(entries))
		});

		for target in fetched.data.iter().filter_map(FavoriteListEntry::target) {
			self.cache().store_query(target.check_key(), CacheValue::Flag(true));
		}

		Ok(fetched)
	}
}
