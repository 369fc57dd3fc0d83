//! File-backed [`SecureStorage`] for desktop builds and local tooling.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	storage::{SecureStorage, StorageError, StorageFuture},
};

/// Persists items to a JSON file after each mutation.
///
/// Every write replaces the whole snapshot through a temporary file and a rename, so a crash
/// leaves either the old or the new snapshot on disk.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStorage {
	/// Opens (or creates) storage at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StorageError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StorageError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StorageError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StorageError::Backend {
				message: format!("Failed to create storage directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StorageError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StorageError::Serialization {
				message: format!("Failed to serialize storage snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StorageError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StorageError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StorageError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl SecureStorage for FileStorage {
	fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let previous = guard.insert(key.to_owned(), value);

			if let Err(e) = self.persist_locked(&guard) {
				// Keep memory and disk in agreement when the snapshot could not be written.
				match previous {
					Some(value) => guard.insert(key.to_owned(), value),
					None => guard.remove(key),
				};

				return Err(e);
			}

			Ok(())
		})
	}

	fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if let Some(previous) = guard.remove(key) {
				if let Err(e) = self.persist_locked(&guard) {
					guard.insert(key.to_owned(), previous);

					return Err(e);
				}
			}

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"venue_api_file_storage_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn items_survive_reopen_and_removal_is_persisted() {
		let path = temp_path();
		let storage = FileStorage::open(&path).expect("Failed to open file storage.");

		storage.set_item("session", "payload".into()).await.expect("Failed to store item.");
		storage.set_item("other", "value".into()).await.expect("Failed to store second item.");
		drop(storage);

		let reopened = FileStorage::open(&path).expect("Failed to reopen file storage.");

		assert_eq!(
			reopened.get_item("session").await.expect("Read should succeed."),
			Some("payload".into())
		);

		reopened.remove_item("session").await.expect("Failed to remove item.");
		drop(reopened);

		let reopened = FileStorage::open(&path).expect("Failed to reopen file storage again.");

		assert_eq!(reopened.get_item("session").await.expect("Read should succeed."), None);
		assert_eq!(
			reopened.get_item("other").await.expect("Read should succeed."),
			Some("value".into())
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary storage snapshot {}: {e}", path.display())
		});
	}
}
