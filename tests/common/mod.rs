//! Fixtures shared by the integration suites.

#![allow(dead_code)]

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::MockServer;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use venue_api_core::{
	auth::TokenRecord,
	cache::QueryCache,
	client::{ApiClient, ReqwestApiClient},
	config::ClientConfig,
	http::ReqwestTransport,
	mutation::MutationEngine,
	storage::MemoryStorage,
	vault::TokenVault,
};

pub const USER_ID: &str = "user-1";

pub fn config(server: &MockServer) -> ClientConfig {
	config_with_timeout(server, StdDuration::from_secs(5))
}

pub fn config_with_timeout(server: &MockServer, timeout: StdDuration) -> ClientConfig {
	let base = Url::parse(&server.base_url()).expect("Mock server URL should parse.");

	ClientConfig::builder(base)
		.timeout(timeout)
		.build()
		.expect("Loopback config should be accepted.")
}

pub async fn vault_with(access: &str, refresh: &str) -> Arc<TokenVault> {
	let vault = TokenVault::new(Arc::new(MemoryStorage::default()));
	let record = TokenRecord::new(access, refresh).expiring_in(Duration::hours(1));

	vault.set(record).await.expect("Seeding the vault should succeed.");

	Arc::new(vault)
}

pub async fn client(server: &MockServer, access: &str, refresh: &str) -> ReqwestApiClient {
	let vault = vault_with(access, refresh).await;

	ApiClient::new(config(server), vault).expect("Reqwest client should build.")
}

pub async fn engine(server: &MockServer) -> MutationEngine<ReqwestTransport> {
	MutationEngine::new(client(server, "access-1", "refresh-1").await, Arc::new(QueryCache::default()))
}

pub fn bearer(token: &str) -> String {
	format!("Bearer {token}")
}

pub fn token_body(access: &str, refresh: &str) -> String {
	let expires_at = OffsetDateTime::now_utc().unix_timestamp() + 3_600;

	format!(r#"{{"access_token":"{access}","refresh_token":"{refresh}","expires_at":{expires_at}}}"#)
}
