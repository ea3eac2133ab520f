//! Application configuration management

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Result};

pub mod app_config;
pub mod sync_config;

pub use app_config::{AppConfig, RemoteConfig, StorageConfig};
pub use sync_config::{QueueConfig, ReplicationConfig, SyncConfig};

/// Platform-specific data directory resolution
pub fn default_data_dir() -> Result<PathBuf> {
	#[cfg(target_os = "windows")]
	let dir = dirs::data_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("Hullsync");

	#[cfg(not(target_os = "windows"))]
	let dir = dirs::data_local_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("hullsync");

	fs::create_dir_all(&dir)?;

	Ok(dir)
}
