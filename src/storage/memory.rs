//! Thread-safe in-memory [`SecureStorage`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	storage::{SecureStorage, StorageError, StorageFuture},
};

type ItemMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps items in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(ItemMap);
impl MemoryStorage {
	/// Returns the number of stored items.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn set_now(map: ItemMap, key: String, value: String) -> Result<(), StorageError> {
		map.write().insert(key, value);

		Ok(())
	}
}
impl SecureStorage for MemoryStorage {
	fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::set_now(map, key, value) })
	}

	fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}
