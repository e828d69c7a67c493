use eh_identity::ServiceIdentity;

use std::{fmt, io, path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

mod encrypted;
mod file;
mod memory;

pub use encrypted::{EncryptedStore, STORE_KEY_LEN};
pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("failed to encrypt store entry <key='{key}'>: {reason}")]
	Encryption { key: String, reason: String },
	#[error("failed to decrypt store entry <key='{key}'>: {reason}")]
	Decryption { key: String, reason: String },
	#[error("store entry name is not a valid key: <name='{0}'>")]
	InvalidEntryName(String),
	#[error("failed to (de)serialize a persisted identity: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl fmt::Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}

/// Byte oriented key-value storage backing the identity store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

	async fn remove(&self, key: &str) -> Result<(), StoreError>;

	/// Lists every entry. Only a failure to list at all is an `Err`, an entry that can't be
	/// read back is reported on its own so the others stay usable.
	async fn entries(&self) -> Result<Vec<StoreEntry>, StoreError>;
}

/// One listed entry of a [`KeyValueStore`].
pub type StoreEntry = Result<(String, Vec<u8>), StoreError>;

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		(**self).put(key, value).await
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		(**self).get(key).await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		(**self).remove(key).await
	}

	async fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
		(**self).entries().await
	}
}

/// Unit of local persistence. A record without identity is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
	pub id: String,
	pub identity: Option<ServiceIdentity>,
	pub timestamp: DateTime<Utc>,
}

impl PersistedRecord {
	pub fn is_tombstone(&self) -> bool {
		self.identity.is_none()
	}
}

/// Typed view over a [`KeyValueStore`], keyed by identity id.
#[derive(Clone)]
pub struct IdentityStore {
	inner: Arc<dyn KeyValueStore>,
}

impl IdentityStore {
	pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
		Self { inner }
	}

	pub async fn save(&self, identity: &ServiceIdentity) -> Result<(), StoreError> {
		self.put(PersistedRecord {
			id: identity.id().to_string(),
			identity: Some(identity.clone()),
			timestamp: Utc::now(),
		})
		.await
	}

	pub async fn tombstone(&self, id: &str) -> Result<(), StoreError> {
		self.put(PersistedRecord {
			id: id.to_string(),
			identity: None,
			timestamp: Utc::now(),
		})
		.await
	}

	pub async fn get(&self, id: &str) -> Result<Option<PersistedRecord>, StoreError> {
		self.inner
			.get(id)
			.await?
			.map(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
			.transpose()
	}

	pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
		self.inner.remove(id).await
	}

	/// Every record that could be read back. Unreadable entries are logged and skipped.
	pub async fn load_all(&self) -> Result<Vec<PersistedRecord>, StoreError> {
		Ok(self
			.inner
			.entries()
			.await?
			.into_iter()
			.filter_map(|entry| match entry {
				Ok((key, bytes)) => serde_json::from_slice::<PersistedRecord>(&bytes)
					.map_err(|e| warn!(%key, ?e, "Skipping unreadable persisted identity"))
					.ok(),
				Err(e) => {
					warn!(?e, "Skipping unreadable identity store entry");
					None
				}
			})
			.collect())
	}

	async fn put(&self, record: PersistedRecord) -> Result<(), StoreError> {
		self.inner
			.put(&record.id, serde_json::to_vec(&record)?)
			.await
	}
}
