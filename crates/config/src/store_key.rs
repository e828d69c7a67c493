use eh_scope::STORE_KEY_LEN;

use anyhow::{anyhow, Context, Result};
use rand::RngCore;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

pub const STORE_KEY_FILE_NAME: &str = "identity_store.key";

/// Reads the key of the encrypted identity store, generating and saving a new one on first start.
pub fn load_or_create_store_key(data_dir: &Path) -> Result<[u8; STORE_KEY_LEN]> {
	let key_path = data_dir.join(STORE_KEY_FILE_NAME);

	match fs::read(&key_path) {
		Ok(bytes) => <[u8; STORE_KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
			anyhow!(
				"Store key at {:?} is {} bytes long, expected {}",
				key_path,
				bytes.len(),
				STORE_KEY_LEN
			)
		}),

		Err(e) if e.kind() == ErrorKind::NotFound => {
			let mut key = [0; STORE_KEY_LEN];
			rand::thread_rng().fill_bytes(&mut key);

			fs::create_dir_all(data_dir)?;
			fs::write(&key_path, key)
				.with_context(|| format!("Failed to write store key to {key_path:?}"))?;
			restrict_permissions(&key_path)?;

			info!("Generated a new identity store key at {:?}", key_path);
			Ok(key)
		}

		Err(e) => {
			Err(e).with_context(|| format!("Failed to read store key from {key_path:?}"))
		}
	}
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
	use std::os::unix::fs::PermissionsExt;

	fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
	Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
	Ok(())
}
