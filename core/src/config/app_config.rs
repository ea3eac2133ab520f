//! Application configuration

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{default_data_dir, SyncConfig};

const CONFIG_FILE_NAME: &str = "hullsync.json";
const DATABASE_FILE_NAME: &str = "hullsync.db";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
	/// Config schema version
	pub version: u32,

	/// Data directory path
	pub data_dir: PathBuf,

	/// Logging level
	pub log_level: String,

	/// Remote backend endpoint
	#[serde(default)]
	pub remote: RemoteConfig,

	/// Embedded store limits
	#[serde(default)]
	pub storage: StorageConfig,

	/// Sync queue and replication tunables
	#[serde(default)]
	pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
	/// Base URL of the backend, e.g. `https://project.example.co`
	pub api_url: String,

	/// Public API key sent with every request
	pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	/// Largest value the embedded store accepts for a single key (0 = unlimited)
	pub quota_bytes: usize,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			quota_bytes: 50 * 1024 * 1024, // 50MB
		}
	}
}

impl StorageConfig {
	pub fn quota(&self) -> Option<usize> {
		(self.quota_bytes > 0).then_some(self.quota_bytes)
	}
}

impl AppConfig {
	pub const fn target_version() -> u32 {
		1
	}

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
			let mut config: AppConfig = serde_json::from_str(&json)?;

			if config.version < Self::target_version() {
				info!(
					"Upgrading config from v{} to v{}",
					config.version,
					Self::target_version()
				);
				config.version = Self::target_version();
				config.save()?;
			}

			Ok(config)
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	/// Load or create configuration
	pub fn load_or_create(data_dir: &Path) -> Result<Self> {
		Self::load_from(data_dir).or_else(|e| {
			warn!("Failed to load config, falling back to defaults: {e:#}");
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		})
	}

	/// Create default configuration with specific data directory
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			log_level: "info".to_string(),
			remote: RemoteConfig::default(),
			storage: StorageConfig::default(),
			sync: SyncConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE_NAME);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	/// Get the path for logs directory
	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	/// Path of the embedded database holding the document tree and the sync queue
	pub fn database_path(&self) -> PathBuf {
		self.data_dir.join(DATABASE_FILE_NAME)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn creates_default_config_when_missing() {
		let dir = tempfile::tempdir().unwrap();

		let config = AppConfig::load_from(dir.path()).unwrap();

		assert_eq!(config.version, AppConfig::target_version());
		assert!(dir.path().join(CONFIG_FILE_NAME).exists());
		assert_eq!(config.sync.replication.page_size, 10);
	}

	#[test]
	fn round_trips_through_disk() {
		let dir = tempfile::tempdir().unwrap();

		let mut config = AppConfig::default_with_dir(dir.path().to_path_buf());
		config.remote.api_url = "https://backend.test".to_string();
		config.sync.queue.max_retries = 7;
		config.save().unwrap();

		let loaded = AppConfig::load_from(dir.path()).unwrap();
		assert_eq!(loaded.remote.api_url, "https://backend.test");
		assert_eq!(loaded.sync.queue.max_retries, 7);
	}

	#[test]
	fn falls_back_to_defaults_on_garbage() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();

		let config = AppConfig::load_or_create(dir.path()).unwrap();
		assert_eq!(config.log_level, "info");
	}
}
