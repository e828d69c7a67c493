use anyhow::{anyhow, Result};
use std::fs;
use std::path::PathBuf;

mod broker_config;
mod logging;
mod store_key;

pub use broker_config::{AuthConfig, BrokerConfig, Migrate, ScopeCacheConfig, CONFIG_FILE_NAME};
pub use logging::{init_logging, LOG_ENV_VAR};
pub use store_key::{load_or_create_store_key, STORE_KEY_FILE_NAME};

/// Per-user data directory of the edge hub, created on first use
pub fn default_data_dir() -> Result<PathBuf> {
	let dir = dirs::data_local_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("edgehub");

	fs::create_dir_all(&dir)?;

	Ok(dir)
}
