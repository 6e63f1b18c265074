//! JSON-file-backed [`PreferenceStore`] for desktop hosts and local development.
//!
//! Only tenant selections reach the disk. Entries are keyed by a SHA-256 digest of the user
//! subject so the file never carries user identifiers.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserId},
	store::{PreferenceStore, StoreError, StoreFuture},
};

type Preferences = BTreeMap<String, TenantId>;

fn subject_key(user: &UserId) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(user.as_bytes()))
}

/// Persists tenant selections to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FilePreferenceStore {
	path: PathBuf,
	inner: Arc<RwLock<Preferences>>,
}
impl FilePreferenceStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Preferences, StoreError> {
		if !path.exists() {
			return Ok(Preferences::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Preferences::new());
		}

		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&bytes)).map_err(
			|e| StoreError::Serialization {
				message: format!(
					"Failed to parse {} at {}: {}",
					path.display(),
					e.path(),
					e.inner()
				),
			},
		)
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Preferences) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize preferences: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl PreferenceStore for FilePreferenceStore {
	fn selected_tenant<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<TenantId>> {
		Box::pin(async move { Ok(self.inner.read().get(&subject_key(user)).cloned()) })
	}

	fn save_selected_tenant<'a>(
		&'a self,
		user: &'a UserId,
		tenant: Option<&'a TenantId>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let key = subject_key(user);
			let mut guard = self.inner.write();
			let changed = match tenant {
				Some(tenant) => guard.insert(key, tenant.clone()).as_ref() != Some(tenant),
				None => guard.remove(&key).is_some(),
			};

			if changed {
				self.persist_locked(&guard)?;
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
			"oidc_session_preferences_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn selection_survives_reopen() {
		let path = temp_path();
		let store = FilePreferenceStore::open(&path).expect("Failed to open preference file.");
		let user = UserId::new("user-1").expect("User fixture should be valid.");
		let tenant = TenantId::new("store-42").expect("Tenant fixture should be valid.");

		store
			.save_selected_tenant(&user, Some(&tenant))
			.await
			.expect("Failed to save tenant preference.");
		drop(store);

		let reopened = FilePreferenceStore::open(&path).expect("Failed to reopen preference file.");
		let loaded = reopened.selected_tenant(&user).await.expect("Failed to load preference.");

		assert_eq!(loaded, Some(tenant));

		let written = fs::read_to_string(&path).expect("Failed to read the preference file.");

		assert!(written.contains("store-42"));
		assert!(!written.contains("user-1"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary preference file {}: {e}", path.display())
		});
	}

	#[test]
	fn corrupt_file_reports_serialization_error() {
		let path = temp_path();

		fs::write(&path, b"{\"user-1\": 7}").expect("Failed to write corrupt fixture.");

		let err = FilePreferenceStore::open(&path).expect_err("Corrupt file should be rejected.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary preference file {}: {e}", path.display())
		});
	}
}
