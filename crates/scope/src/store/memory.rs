use super::{KeyValueStore, StoreEntry, StoreError};

use std::{
	collections::BTreeMap,
	sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		self.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(key.to_string(), value);
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		Ok(self
			.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(key)
			.cloned())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(key);
		Ok(())
	}

	async fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
		Ok(self
			.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(|(key, value)| Ok((key.clone(), value.clone())))
			.collect())
	}
}
