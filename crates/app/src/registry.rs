use chrono::{DateTime, Utc};
use resume_search_core::{CollectionPaths, CollectionSummary};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS user_databases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    db_path TEXT NOT NULL,
    index_path TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (owner, name)
)";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RegistryEntry {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub db_path: String,
    pub index_path: String,
    pub record_count: i64,
    pub created_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn paths(&self) -> CollectionPaths {
        CollectionPaths {
            name: self.name.clone(),
            db_path: PathBuf::from(&self.db_path),
            index_path: PathBuf::from(&self.index_path),
        }
    }
}

/// Catalog of collections built so far, keyed by owner and collection name.
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        debug!(path = %path.display(), "registry ready");
        Ok(Self { pool })
    }

    pub async fn register(
        &self,
        owner: &str,
        summary: &CollectionSummary,
    ) -> Result<RegistryEntry, sqlx::Error> {
        let record_count = i64::try_from(summary.record_count).unwrap_or(i64::MAX);
        let id = sqlx::query(
            "INSERT INTO user_databases (owner, name, db_path, index_path, record_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner)
        .bind(&summary.name)
        .bind(summary.db_path.to_string_lossy().as_ref())
        .bind(summary.index_path.to_string_lossy().as_ref())
        .bind(record_count)
        .bind(summary.created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(RegistryEntry {
            id,
            owner: owner.to_string(),
            name: summary.name.clone(),
            db_path: summary.db_path.to_string_lossy().into_owned(),
            index_path: summary.index_path.to_string_lossy().into_owned(),
            record_count,
            created_at: summary.created_at,
        })
    }

    /// Registers a freshly built collection. If the row cannot be written the
    /// artifacts are deleted, so the name stays free for the next ingest.
    pub async fn register_or_discard(
        &self,
        owner: &str,
        summary: &CollectionSummary,
    ) -> Result<RegistryEntry, sqlx::Error> {
        match self.register(owner, summary).await {
            Ok(entry) => Ok(entry),
            Err(error) => {
                warn!(collection = %summary.name, %error, "registration failed, removing artifacts");
                for path in [&summary.db_path, &summary.index_path] {
                    if let Err(remove) = tokio::fs::remove_file(path).await {
                        warn!(path = %path.display(), error = %remove, "failed to remove artifact");
                    }
                }
                Err(error)
            }
        }
    }

    /// Newest first.
    pub async fn list(&self, owner: &str) -> Result<Vec<RegistryEntry>, sqlx::Error> {
        sqlx::query_as::<_, RegistryEntry>(
            "SELECT * FROM user_databases WHERE owner = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find(&self, owner: &str, name: &str) -> Result<Option<RegistryEntry>, sqlx::Error> {
        sqlx::query_as::<_, RegistryEntry>(
            "SELECT * FROM user_databases WHERE owner = ? AND name = ?",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
