//! Durable holder of the current session token pair.
//!
//! [`TokenVault`] keeps a process-local mirror of the record persisted in [`SecureStorage`].
//! Reads come from the mirror and never touch storage; writes go to storage first and only
//! then replace the mirror, so a failed write leaves the previous session visible. The access
//! token, refresh token, and expiry are serialized into a single storage item, which makes the
//! group write atomic on top of the per-key atomicity storage provides.

// self
use crate::{
	_prelude::*,
	auth::{StoredTokenRecord, TokenRecord, TokenSecret},
	obs::{self, FlowKind},
	storage::{SecureStorage, StorageError},
};

/// Storage key holding the serialized session.
pub const SESSION_KEY: &str = "venue_api.session";

/// Explicitly constructed session store with an `init`/`dispose` lifecycle.
pub struct TokenVault {
	storage: Arc<dyn SecureStorage>,
	key: String,
	mirror: RwLock<Option<TokenRecord>>,
	write_guard: AsyncMutex<()>,
}
impl TokenVault {
	/// Creates an uninitialized vault over `storage`.
	pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
		Self {
			storage,
			key: SESSION_KEY.into(),
			mirror: RwLock::new(None),
			write_guard: AsyncMutex::new(()),
		}
	}

	/// Overrides the storage key, letting several vaults share one backend.
	pub fn with_key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();

		self
	}

	/// Loads the persisted session into memory and returns it.
	///
	/// A persisted document that cannot be decoded is removed and treated as "no session".
	pub async fn init(&self) -> Result<Option<TokenRecord>> {
		let _write = self.write_guard.lock().await;
		let Some(raw) = self.storage.get_item(&self.key).await? else {
			*self.mirror.write() = None;

			return Ok(None);
		};
		let decoded = serde_json::from_str::<StoredTokenRecord>(&raw)
			.map_err(|e| e.to_string())
			.and_then(|stored| stored.into_record().map_err(|e| e.to_string()));

		match decoded {
			Ok(record) => {
				*self.mirror.write() = Some(record.clone());

				Ok(Some(record))
			},
			Err(reason) => {
				obs::warn_event(FlowKind::Session, "vault_init", &reason);
				*self.mirror.write() = None;
				self.storage.remove_item(&self.key).await?;

				Ok(None)
			},
		}
	}

	/// Drops the in-memory session without touching storage.
	pub fn dispose(&self) {
		*self.mirror.write() = None;
	}

	/// Returns the current session, if any.
	pub fn get(&self) -> Option<TokenRecord> {
		self.mirror.read().clone()
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.mirror.read().as_ref().map(|record| record.access_token.clone())
	}

	/// Persists `record` and makes it the current session.
	pub async fn set(&self, record: TokenRecord) -> Result<()> {
		let _write = self.write_guard.lock().await;
		let payload = serde_json::to_string(&record.to_stored()).map_err(|e| {
			StorageError::Serialization { message: format!("Failed to encode session: {e}") }
		})?;

		self.storage.set_item(&self.key, payload).await?;
		*self.mirror.write() = Some(record);

		Ok(())
	}

	/// Forgets the current session in memory and in storage.
	///
	/// The in-memory session is dropped even when the storage removal fails.
	pub async fn clear(&self) -> Result<()> {
		let _write = self.write_guard.lock().await;

		*self.mirror.write() = None;
		self.storage.remove_item(&self.key).await?;

		Ok(())
	}

	/// Returns `true` if there is no session or it expires within `buffer`.
	pub fn is_expired(&self, buffer: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), buffer)
	}

	/// Clock-injected form of [`TokenVault::is_expired`].
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		self.mirror.read().as_ref().is_none_or(|record| record.is_expired_at(now, buffer))
	}
}
impl Debug for TokenVault {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenVault")
			.field("key", &self.key)
			.field("has_session", &self.mirror.read().is_some())
			.finish()
	}
}
