//! Edge hub configuration

use super::default_data_dir;
use eh_auth::AuthChainValidatorSettings;
use eh_identity::{new_hierarchy, IdentityHierarchy};
use eh_scope::ScopeCacheSettings;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "edgehub.json";

/// Versioned configuration that upgrades itself one schema version at a time
pub trait Migrate {
	fn current_version(&self) -> u32;

	fn target_version() -> u32;

	fn migrate(&mut self) -> Result<()>;
}

/// Main edge hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// Config schema version
	pub version: u32,

	/// Data directory path, holds the config file, the identity store and its key
	#[serde(skip)]
	pub data_dir: PathBuf,

	/// Id of the edge device this hub runs on
	pub actor_device_id: String,

	/// Logging level
	pub log_level: String,

	/// Whether child edge devices may connect through this hub
	pub nested_edge_enabled: bool,

	pub max_connected_clients: usize,

	#[serde(default)]
	pub scope_cache: ScopeCacheConfig,

	#[serde(default)]
	pub auth: AuthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCacheConfig {
	/// Seconds between two periodic full refreshes
	pub refresh_rate_secs: u64,

	/// Minimum seconds between two targeted refreshes of one identity
	pub refresh_delay_secs: u64,

	/// Deepest auth chain kept, longer ones are dropped
	#[serde(default = "default_max_nesting_depth")]
	pub max_nesting_depth: usize,
}

impl Default for ScopeCacheConfig {
	fn default() -> Self {
		Self {
			refresh_rate_secs: 60 * 60,
			refresh_delay_secs: 2 * 60,
			max_nesting_depth: default_max_nesting_depth(),
		}
	}
}

fn default_max_nesting_depth() -> usize {
	5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
	pub allow_device_auth_for_module: bool,

	/// Hand clients unknown to the scope over to the underlying authenticator
	pub fallback_to_underlying: bool,
}

impl Default for AuthConfig {
	fn default() -> Self {
		Self {
			allow_device_auth_for_module: true,
			fallback_to_underlying: true,
		}
	}
}

impl BrokerConfig {
	/// Load configuration from the default location
	pub fn load() -> Result<Self> {
		let data_dir = default_data_dir()?;
		Self::load_from(&data_dir)
	}

	/// Load configuration from a specific data directory
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE_NAME);

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)?;
			let mut config: BrokerConfig = serde_json::from_str(&json)?;
			config.data_dir = data_dir.to_path_buf();

			if config.actor_device_id.is_empty() {
				return Err(anyhow!("Config at {:?} has no actor device id", config_path));
			}

			// Apply migrations if needed
			if config.current_version() < Self::target_version() {
				info!(
					"Migrating config from v{} to v{}",
					config.version,
					Self::target_version()
				);
				config.migrate()?;
				config.save()?;
			}

			Ok(config)
		} else {
			Err(anyhow!("No config found at {:?}", config_path))
		}
	}

	/// Load or create configuration for `actor_device_id`
	pub fn load_or_create(data_dir: &Path, actor_device_id: &str) -> Result<Self> {
		Self::load_from(data_dir).or_else(|e| {
			warn!(?e, "No usable config, creating default in {:?}", data_dir);
			let config = Self::default_with_dir(data_dir.to_path_buf(), actor_device_id);
			config.save()?;
			Ok(config)
		})
	}

	/// Create default configuration with specific data directory
	pub fn default_with_dir(data_dir: PathBuf, actor_device_id: impl Into<String>) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			actor_device_id: actor_device_id.into(),
			log_level: "info".to_string(),
			nested_edge_enabled: true,
			max_connected_clients: 101,
			scope_cache: ScopeCacheConfig::default(),
			auth: AuthConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		// Ensure directory exists
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE_NAME);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	/// Get the path of the persisted identity store
	pub fn identity_store_dir(&self) -> PathBuf {
		self.data_dir.join("identities")
	}

	pub fn scope_cache_settings(&self) -> ScopeCacheSettings {
		ScopeCacheSettings {
			refresh_rate: Duration::from_secs(self.scope_cache.refresh_rate_secs),
			refresh_delay: Duration::from_secs(self.scope_cache.refresh_delay_secs),
		}
	}

	pub fn validator_settings(&self) -> AuthChainValidatorSettings {
		AuthChainValidatorSettings {
			nested_edge_enabled: self.nested_edge_enabled,
			allow_device_auth_for_module: self.auth.allow_device_auth_for_module,
			fallback_to_underlying: self.auth.fallback_to_underlying,
		}
	}

	/// Hierarchy of the actor device, nested or flat as configured
	pub fn hierarchy(&self) -> Arc<dyn IdentityHierarchy> {
		new_hierarchy(
			self.actor_device_id.clone(),
			self.nested_edge_enabled,
			self.scope_cache.max_nesting_depth,
		)
	}
}

impl Migrate for BrokerConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		2
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				self.version = 1;
				self.migrate()
			}
			1 => {
				// v2 made the auth chain depth configurable
				self.scope_cache.max_nesting_depth = default_max_nesting_depth();
				self.version = 2;
				Ok(())
			}
			2 => Ok(()),
			v => Err(anyhow!("Unknown config version: {}", v)),
		}
	}
}
