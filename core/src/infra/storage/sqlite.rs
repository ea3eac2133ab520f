use std::{fs, path::Path};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
	sea_query::OnConflict, ActiveValue::Set, ConnectOptions, Database, DatabaseConnection,
	EntityTrait,
};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use super::{check_quota, DocumentStorage, StorageError, StorageKey};
use crate::infra::db::{entities::kv_entry, Migrator};

/// [`DocumentStorage`] backed by the `kv_store` table of a SQLite database.
pub struct SqliteStorage {
	conn: DatabaseConnection,
	quota: Option<u64>,
}

impl SqliteStorage {
	/// Opens (creating if needed) the database at `path` and runs pending migrations.
	pub async fn open(path: &Path, quota: Option<u64>) -> Result<Self, StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(|e| StorageError::Unavailable(e.to_string()))?;
		}

		let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
		options.sqlx_logging(false);

		let conn = Database::connect(options).await?;
		Migrator::up(&conn, None).await?;

		info!(path = %path.display(), "Opened local database");

		Ok(Self { conn, quota })
	}

	pub fn connection(&self) -> &DatabaseConnection {
		&self.conn
	}
}

#[async_trait]
impl DocumentStorage for SqliteStorage {
	async fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
		Ok(kv_entry::Entity::find_by_id(key.to_string())
			.one(&self.conn)
			.await?
			.map(|entry| entry.value))
	}

	async fn save(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
		check_quota(key, value, self.quota)?;

		let entry = kv_entry::ActiveModel {
			key: Set(key.to_string()),
			value: Set(value.to_string()),
			updated_at: Set(Utc::now()),
		};

		kv_entry::Entity::insert(entry)
			.on_conflict(
				OnConflict::column(kv_entry::Column::Key)
					.update_columns([kv_entry::Column::Value, kv_entry::Column::UpdatedAt])
					.to_owned(),
			)
			.exec_without_returning(&self.conn)
			.await?;

		debug!(%key, bytes = value.len(), "Persisted document");

		Ok(())
	}

	async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
		kv_entry::Entity::delete_by_id(key.to_string())
			.exec(&self.conn)
			.await?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[tokio::test]
	async fn documents_survive_reopen() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("hullsync.db");

		{
			let storage = SqliteStorage::open(&path, None).await.unwrap();
			storage.save(StorageKey::SyncQueue, "[1]").await.unwrap();
			storage.save(StorageKey::SyncQueue, "[1,2]").await.unwrap();
		}

		let storage = SqliteStorage::open(&path, None).await.unwrap();
		assert_eq!(
			storage.load(StorageKey::SyncQueue).await.unwrap().as_deref(),
			Some("[1,2]")
		);
		assert!(storage.load(StorageKey::InspectionData).await.unwrap().is_none());

		storage.remove(StorageKey::SyncQueue).await.unwrap();
		assert!(storage.load(StorageKey::SyncQueue).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn oversized_documents_are_rejected() {
		let dir = TempDir::new().unwrap();
		let storage = SqliteStorage::open(&dir.path().join("db.sqlite"), Some(8))
			.await
			.unwrap();

		let err = storage
			.save(StorageKey::InspectionData, "0123456789")
			.await
			.unwrap_err();

		assert!(err.is_quota_exceeded());
		assert!(storage.load(StorageKey::InspectionData).await.unwrap().is_none());
	}
}
