use super::{KeyValueStore, StoreEntry, StoreError};

use std::fmt;

use async_trait::async_trait;
use chacha20poly1305::{
	aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
	XChaCha20Poly1305, XNonce,
};

pub const STORE_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 24;

/// Encrypts every value of the wrapped store with XChaCha20-Poly1305.
///
/// Entries are laid out as `nonce || cipher text`, the entry key is bound as associated data so
/// values can't be swapped between keys.
pub struct EncryptedStore<S> {
	inner: S,
	cipher: XChaCha20Poly1305,
}

impl<S: KeyValueStore> EncryptedStore<S> {
	pub fn new(inner: S, key: &[u8; STORE_KEY_LEN]) -> Self {
		Self {
			inner,
			cipher: XChaCha20Poly1305::new(key.into()),
		}
	}

	fn encrypt(&self, key: &str, value: &[u8]) -> Result<Vec<u8>, StoreError> {
		let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
		let cipher_text = self
			.cipher
			.encrypt(
				&nonce,
				Payload {
					msg: value,
					aad: key.as_bytes(),
				},
			)
			.map_err(|e| StoreError::Encryption {
				key: key.to_string(),
				reason: e.to_string(),
			})?;

		let mut result = nonce.to_vec();
		result.extend_from_slice(&cipher_text);

		Ok(result)
	}

	fn decrypt(&self, key: &str, encrypted: &[u8]) -> Result<Vec<u8>, StoreError> {
		if encrypted.len() < NONCE_LEN {
			return Err(StoreError::Decryption {
				key: key.to_string(),
				reason: "cipher text shorter than its nonce".to_string(),
			});
		}

		let (nonce, cipher_text) = encrypted.split_at(NONCE_LEN);
		self.cipher
			.decrypt(
				XNonce::from_slice(nonce),
				Payload {
					msg: cipher_text,
					aad: key.as_bytes(),
				},
			)
			.map_err(|e| StoreError::Decryption {
				key: key.to_string(),
				reason: e.to_string(),
			})
	}
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for EncryptedStore<S> {
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let encrypted = self.encrypt(key, &value)?;
		self.inner.put(key, encrypted).await
	}

	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
		self.inner
			.get(key)
			.await?
			.map(|encrypted| self.decrypt(key, &encrypted))
			.transpose()
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.inner.remove(key).await
	}

	async fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
		Ok(self
			.inner
			.entries()
			.await?
			.into_iter()
			.map(|entry| {
				let (key, encrypted) = entry?;
				let value = self.decrypt(&key, &encrypted)?;
				Ok((key, value))
			})
			.collect())
	}
}

impl<S> fmt::Debug for EncryptedStore<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EncryptedStore")
			.field("cipher", &"[REDACTED]")
			.finish_non_exhaustive()
	}
}
