//! Walks through a session refresh and an optimistic favorite toggle against an in-process API.
//!
//! 1. Implement [`ApiTransport`] for a fake backend whose first access token is already revoked.
//! 2. Seed a [`TokenVault`] with that token and build an [`ApiClient`] over the fake backend.
//! 3. Toggle a favorite twice; the first call hits a 401, refreshes once, and retries.
//! 4. Make the backend fail and observe the optimistic write being rolled back.

// std
use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU32, Ordering},
	},
};
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use url::Url;
// self
use venue_api_core::{
	auth::TokenRecord,
	cache::{CacheKey, CacheValue, QueryCache},
	client::ApiClient,
	config::ClientConfig,
	http::{ApiRequest, ApiResponse, ApiTransport, HttpMethod, TransportFuture},
	mutation::{FavoriteListEntry, FavoriteTarget, MutationEngine},
	storage::MemoryStorage,
	vault::TokenVault,
};

const USER_ID: &str = "demo-user";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = ClientConfig::builder(Url::parse("https://api.venue.example")?).build()?;
	let vault = Arc::new(TokenVault::new(Arc::new(MemoryStorage::default())));

	vault
		.set(TokenRecord::new("revoked-access", "demo-refresh").expiring_in(Duration::hours(1)))
		.await?;

	let backend = Arc::new(FakeBackend::default());
	let client: ApiClient<FakeBackend> = ApiClient::with_transport(config, vault, backend.clone())?;
	let engine = MutationEngine::new(client, Arc::new(QueryCache::default()));
	let target = FavoriteTarget::Event("jazz-night".into());

	println!("Cached favorite flag before toggling: {:?}.", engine.is_favorite(&target));

	let now = engine.toggle_favorite(USER_ID, target.clone()).await?;

	println!(
		"Favorite after first toggle: {now}; refresh calls so far: {}.",
		engine.client().coordinator().metrics.attempts()
	);

	// A removal needs the server id, which comes from the cached list.
	engine.cache().store_query(
		CacheKey::FavoriteList { user_id: USER_ID.into() },
		CacheValue::Favorites(backend.listed()),
	);
	backend.failing.store(true, Ordering::SeqCst);

	match engine.toggle_favorite(USER_ID, target.clone()).await {
		Ok(state) => println!("Backend unexpectedly accepted the toggle: {state}."),
		Err(e) => println!(
			"Toggle failed with `{e}`; cached flag rolled back to {:?}.",
			engine.is_favorite(&target)
		),
	}

	backend.failing.store(false, Ordering::SeqCst);

	let now = engine.toggle_favorite(USER_ID, target).await?;

	println!(
		"Favorite after second toggle: {now}; backend holds {} favorite(s).",
		backend.listed().len()
	);

	Ok(())
}

/// Minimal favorites backend with a single valid access token.
#[derive(Default)]
struct FakeBackend {
	failing: AtomicBool,
	next_id: AtomicU32,
	favorites: Mutex<HashMap<String, String>>,
}
impl FakeBackend {
	fn listed(&self) -> Vec<FavoriteListEntry> {
		self.favorites
			.lock()
			.iter()
			.map(|(id, event)| FavoriteListEntry {
				id: id.clone(),
				user_id: USER_ID.into(),
				establishment_id: None,
				event_id: Some(event.clone()),
				created_at: OffsetDateTime::UNIX_EPOCH,
			})
			.collect()
	}

	fn handle(&self, request: &ApiRequest) -> ApiResponse {
		let path = request.url.path().to_owned();

		if path == "/auth/refresh" {
			return json(200, serde_json::json!({
				"access_token": "demo-access",
				"refresh_token": "demo-refresh-2",
				"expires_at": (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
			}));
		}
		if request.bearer.as_ref().map(|token| token.expose()) != Some("demo-access") {
			return json(401, serde_json::json!({ "message": "Token revoked." }));
		}
		if self.failing.load(Ordering::SeqCst) {
			return json(503, serde_json::json!({ "message": "Favorites are read-only right now." }));
		}

		match (request.method, path.strip_prefix("/favorites")) {
			(HttpMethod::Post, Some("")) => {
				let body: serde_json::Value =
					serde_json::from_slice(request.body.as_deref().unwrap_or_default())
						.unwrap_or_default();
				let event = body["eventId"].as_str().unwrap_or_default().to_owned();
				let id = format!("fav-{}", self.next_id.fetch_add(1, Ordering::SeqCst));

				self.favorites.lock().insert(id.clone(), event.clone());

				json(201, serde_json::json!({
					"id": id,
					"userId": USER_ID,
					"eventId": event,
					"createdAt": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
				}))
			},
			(HttpMethod::Delete, Some(rest)) => {
				self.favorites.lock().remove(rest.trim_start_matches('/'));

				ApiResponse::new(204, Vec::<u8>::new())
			},
			_ => json(404, serde_json::json!({ "message": "Not found." })),
		}
	}
}
impl ApiTransport for FakeBackend {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move { Ok(self.handle(&request)) })
	}
}

fn json(status: u16, body: serde_json::Value) -> ApiResponse {
	ApiResponse::new(status, body.to_string())
}
