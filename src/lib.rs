//! Resilient API-access core for venue discovery clients: single-flight session refresh, a
//! retrying bearer interceptor, and optimistic cache mutations with exact rollback.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mutation;
pub mod obs;
pub mod refresh;
pub mod scoring;
pub mod storage;
pub mod vault;

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(test)]
mod _preludet {
	//! Scripted transport and fixtures shared by unit tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenRecord,
		config::ClientConfig,
		http::{ApiRequest, ApiResponse, ApiTransport, HttpMethod, TransportFuture},
		storage::MemoryStorage,
		vault::TokenVault,
	};

	type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync>;

	struct Route {
		method: HttpMethod,
		path: String,
		delay: StdDuration,
		handler: Handler,
	}

	/// In-process transport answering from per-route handlers and recording every request.
	#[derive(Default)]
	pub struct ScriptedTransport {
		routes: Mutex<Vec<Route>>,
		sent: Mutex<Vec<ApiRequest>>,
	}
	impl ScriptedTransport {
		pub fn route<F>(self, method: HttpMethod, path: &str, handler: F) -> Self
		where
			F: 'static + Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync,
		{
			self.delayed_route(method, path, StdDuration::ZERO, handler)
		}

		pub fn delayed_route<F>(
			self,
			method: HttpMethod,
			path: &str,
			delay: StdDuration,
			handler: F,
		) -> Self
		where
			F: 'static + Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync,
		{
			self.routes.lock().push(Route {
				method,
				path: path.into(),
				delay,
				handler: Box::new(handler),
			});

			self
		}

		pub fn calls(&self, method: HttpMethod, path: &str) -> usize {
			self.sent
				.lock()
				.iter()
				.filter(|request| request.method == method && request.url.path() == path)
				.count()
		}

		pub fn sent(&self) -> Vec<ApiRequest> {
			self.sent.lock().clone()
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.sent.lock().push(request.clone());

				let (delay, outcome) = {
					let routes = self.routes.lock();

					match routes
						.iter()
						.find(|route| route.method == request.method && route.path == request.url.path())
					{
						Some(route) => (route.delay, (route.handler)(&request)),
						None => (
							StdDuration::ZERO,
							Ok(ApiResponse::new(404, r#"{"message":"No scripted route."}"#)),
						),
					}
				};

				if !delay.is_zero() {
					tokio::time::sleep(delay).await;
				}

				outcome
			})
		}
	}

	pub fn test_config() -> ClientConfig {
		let base = Url::parse("https://api.venue.test").expect("Test base URL should parse.");

		ClientConfig::builder(base).build().expect("Test config should build.")
	}

	pub fn json_response(status: u16, body: serde_json::Value) -> ApiResponse {
		ApiResponse::new(status, body.to_string())
	}

	pub fn token_response(access: &str, refresh: &str) -> ApiResponse {
		json_response(
			200,
			serde_json::json!({
				"access_token": access,
				"refresh_token": refresh,
				"expires_at": (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
			}),
		)
	}

	pub fn bearer_of(request: &ApiRequest) -> Option<&str> {
		request.bearer.as_ref().map(|token| token.expose())
	}

	pub async fn seeded_vault(record: TokenRecord) -> Arc<TokenVault> {
		let vault = TokenVault::new(Arc::new(MemoryStorage::default()));

		vault.set(record).await.expect("Seeding the vault should succeed.");

		Arc::new(vault)
	}
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
