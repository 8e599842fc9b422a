use crate::models::DocumentRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS resumes (
    id INTEGER PRIMARY KEY,
    file_path TEXT NOT NULL,
    stream TEXT NOT NULL,
    candidate_name TEXT NOT NULL,
    extracted_text TEXT NOT NULL,
    ocr_timestamp TEXT NOT NULL
)";

/// Per-collection record table. Ids are assigned by the caller and are never
/// reused or rewritten.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub async fn create(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        debug!(path = %path.display(), "metadata store created");
        Ok(Self { pool })
    }

    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn insert_records(&self, records: &[DocumentRecord]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                "INSERT INTO resumes (id, file_path, stream, candidate_name, extracted_text, ocr_timestamp)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(record.id)
            .bind(&record.file_path)
            .bind(&record.stream)
            .bind(&record.candidate_name)
            .bind(&record.extracted_text)
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<DocumentRecord>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRecord>("SELECT * FROM resumes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn all(&self) -> Result<Vec<DocumentRecord>, sqlx::Error> {
        sqlx::query_as::<_, DocumentRecord>("SELECT * FROM resumes ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resumes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataStore;
    use crate::models::DocumentRecord;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, name: &str) -> DocumentRecord {
        DocumentRecord {
            id,
            file_path: format!("/resumes/{id}.pdf"),
            stream: "AllResumes".to_string(),
            candidate_name: name.to_string(),
            extracted_text: format!("{name} builds things"),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn records_round_trip_in_id_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("team.db");

        let store = MetadataStore::create(&path).await?;
        store
            .insert_records(&[record(0, "Dana Lowell"), record(1, "Victoria Clark")])
            .await?;
        store.close().await;

        let reopened = MetadataStore::open(&path).await?;
        assert_eq!(reopened.count().await?, 2);
        assert_eq!(reopened.get(1).await?, Some(record(1, "Victoria Clark")));
        assert_eq!(reopened.get(7).await?, None);

        let ids: Vec<i64> = reopened.all().await?.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![0, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_id_rolls_back_whole_insert() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let store = MetadataStore::create(&dir.path().join("dup.db")).await?;
        store.insert_records(&[record(0, "A B")]).await?;

        let result = store
            .insert_records(&[record(1, "C D"), record(0, "E F")])
            .await;

        assert!(result.is_err());
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn open_missing_file_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        assert!(MetadataStore::open(&dir.path().join("absent.db")).await.is_err());
        assert!(!dir.path().join("absent.db").exists());
        Ok(())
    }
}
