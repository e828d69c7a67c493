use super::{FileIOError, KeyValueStore, StoreEntry, StoreError};

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

const TEMP_SUFFIX: &str = ".tmp";

/// One file per key under a directory. File names are the hex encoded keys, since identity ids
/// carry `/` and `$`.
#[derive(Debug, Clone)]
pub struct FileStore {
	directory: PathBuf,
}

impl FileStore {
	pub async fn new(directory: impl AsRef<Path> + Send) -> Result<Self, StoreError> {
		let directory = directory.as_ref().to_path_buf();
		fs::create_dir_all(&directory).await.map_err(|e| {
			FileIOError::from((&directory, e, "Failed to create identity store directory"))
		})?;

		Ok(Self { directory })
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.directory.join(hex::encode(key))
	}
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let path = self.path_for(key);
		let mut temp_path = path.clone().into_os_string();
		temp_path.push(TEMP_SUFFIX);

		// Write aside then rename, a crash never leaves a half written entry behind
		fs::write(&temp_path, value).await.map_err(|e| {
			FileIOError::from((&temp_path, e, "Failed to write identity store entry"))
		})?;
		fs::rename(&temp_path, &path).await.map_err(|e| {
			FileIOError::from((&path, e, "Failed to move identity store entry in place")).into()
		})
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		let path = self.path_for(key);
		match fs::read(&path).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(FileIOError::from((&path, e, "Failed to read identity store entry")).into()),
		}
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		let path = self.path_for(key);
		match fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => {
				Err(FileIOError::from((&path, e, "Failed to remove identity store entry")).into())
			}
		}
	}

	async fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
		let mut read_dir = fs::read_dir(&self.directory).await.map_err(|e| {
			FileIOError::from((&self.directory, e, "Failed to list identity store entries"))
		})?;

		let mut entries = Vec::new();
		while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
			FileIOError::from((&self.directory, e, "Failed to list identity store entries"))
		})? {
			let name = entry.file_name().to_string_lossy().into_owned();
			if name.ends_with(TEMP_SUFFIX) {
				continue;
			}

			entries.push(read_entry(&name, &entry.path()).await);
		}

		Ok(entries)
	}
}

async fn read_entry(name: &str, path: &Path) -> StoreEntry {
	let key = hex::decode(name)
		.ok()
		.and_then(|bytes| String::from_utf8(bytes).ok())
		.ok_or_else(|| StoreError::InvalidEntryName(name.to_string()))?;

	let bytes = fs::read(path)
		.await
		.map_err(|e| FileIOError::from((path, e, "Failed to read identity store entry")))?;

	Ok((key, bytes))
}
