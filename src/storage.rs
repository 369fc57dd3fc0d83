//! Secure key-value storage contract and built-in backends.
//!
//! [`SecureStorage`] models the platform keystore: string values addressed by string keys,
//! each write atomic per key. The token vault layers its record-level guarantees on top.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::_prelude::*;

/// Boxed future returned by [`SecureStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + 'a + Send>>;

/// Storage backend contract implemented by keystore adapters.
pub trait SecureStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if present.
	fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value atomically.
	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()>;

	/// Removes the value stored under `key`. Removing a missing key succeeds.
	fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;
}

/// Error type produced by [`SecureStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StorageError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
