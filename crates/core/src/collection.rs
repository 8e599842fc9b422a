//! A named pairing of a [`FlatL2Index`] and a [`MetadataStore`].
//!
//! Row `i` of the index and record `i` of the store always describe the same
//! document. [`CollectionWriter::append`] is the only way rows get in, and
//! both artifacts only appear at their final paths once
//! [`CollectionWriter::finish`] succeeds.

use crate::models::{DocumentRecord, PendingDocument};
use crate::store::MetadataStore;
use crate::vector_index::FlatL2Index;
use crate::{IngestError, SearchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// True when `name` only uses `[A-Za-z0-9._-]` and does not start with a dot.
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPaths {
    pub name: String,
    pub db_path: PathBuf,
    pub index_path: PathBuf,
}

impl CollectionPaths {
    /// `<dir>/<name>.db` and `<dir>/<name>.index`. The name must already be sanitized.
    pub fn new(directory: &Path, name: &str) -> Result<Self, IngestError> {
        if !is_valid_collection_name(name) {
            return Err(IngestError::InvalidArgument(format!(
                "collection name is not sanitized: {name:?}"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            db_path: directory.join(format!("{name}.db")),
            index_path: directory.join(format!("{name}.index")),
        })
    }

    pub fn exists(&self) -> bool {
        self.db_path.exists() || self.index_path.exists()
    }

    fn staging_db(&self) -> PathBuf {
        self.db_path.with_extension("db.partial")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub db_path: PathBuf,
    pub index_path: PathBuf,
    pub record_count: usize,
    pub created_at: DateTime<Utc>,
}

pub struct CollectionWriter {
    paths: CollectionPaths,
    index: FlatL2Index,
    store: MetadataStore,
    next_id: i64,
}

impl CollectionWriter {
    pub async fn create(
        paths: CollectionPaths,
        dimension: usize,
        model_id: impl Into<String>,
    ) -> Result<Self, IngestError> {
        if paths.exists() {
            return Err(IngestError::CollectionExists(paths.name));
        }

        if let Some(parent) = paths.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let staging = paths.staging_db();
        if staging.exists() {
            warn!(path = %staging.display(), "removing stale staging store");
            std::fs::remove_file(&staging)?;
        }

        let store = MetadataStore::create(&staging).await?;
        Ok(Self {
            paths,
            index: FlatL2Index::new(dimension, model_id),
            store,
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    /// Appends one batch to both structures and returns the ids it received.
    pub async fn append(
        &mut self,
        documents: Vec<PendingDocument>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Range<i64>, IngestError> {
        if documents.len() != vectors.len() {
            return Err(IngestError::Index(format!(
                "embedding count {} doesn't match document count {}",
                vectors.len(),
                documents.len()
            )));
        }

        let rows_before = self.index.len();
        if usize::try_from(self.next_id).ok() != Some(rows_before) {
            return Err(IngestError::Index(format!(
                "id counter {} is out of step with {} index rows",
                self.next_id, rows_before
            )));
        }

        let first = self.next_id;
        let records: Vec<DocumentRecord> = documents
            .into_iter()
            .zip(first..)
            .map(|(document, id)| document.into_record(id))
            .collect();

        self.index.add(&vectors)?;
        if let Err(error) = self.store.insert_records(&records).await {
            self.index.truncate(rows_before);
            return Err(error.into());
        }

        self.next_id += records.len() as i64;
        Ok(first..self.next_id)
    }

    /// Persists the index and moves the store into place. Fails with
    /// `NoDataProcessed` and leaves nothing behind when no row was appended.
    pub async fn finish(self) -> Result<CollectionSummary, IngestError> {
        if self.is_empty() {
            let name = self.paths.name.clone();
            self.abort().await;
            return Err(IngestError::NoDataProcessed(format!(
                "no document in {name} produced text"
            )));
        }

        self.store.close().await;
        let staging = self.paths.staging_db();

        if let Err(error) = self.index.save(&self.paths.index_path) {
            remove_quietly(&staging);
            return Err(error.into());
        }

        if let Err(error) = std::fs::rename(&staging, &self.paths.db_path) {
            remove_quietly(&staging);
            remove_quietly(&self.paths.index_path);
            return Err(error.into());
        }

        info!(
            collection = %self.paths.name,
            records = self.index.len(),
            "collection persisted"
        );

        Ok(CollectionSummary {
            name: self.paths.name,
            db_path: self.paths.db_path,
            index_path: self.paths.index_path,
            record_count: self.index.len(),
            created_at: Utc::now(),
        })
    }

    pub async fn abort(self) {
        self.store.close().await;
        remove_quietly(&self.paths.staging_db());
    }
}

fn remove_quietly(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), %error, "failed to remove partial artifact");
        }
    }
}

/// A persisted collection opened for querying.
pub struct Collection {
    name: String,
    index: FlatL2Index,
    store: MetadataStore,
}

impl Collection {
    pub async fn open(paths: &CollectionPaths) -> Result<Self, SearchError> {
        let index = FlatL2Index::load(&paths.index_path).map_err(|error| {
            SearchError::DatabaseUnavailable(format!("{}: {error}", paths.index_path.display()))
        })?;

        if !paths.db_path.exists() {
            return Err(SearchError::DatabaseUnavailable(format!(
                "{}: file not found",
                paths.db_path.display()
            )));
        }

        let store = MetadataStore::open(&paths.db_path).await.map_err(|error| {
            SearchError::DatabaseUnavailable(format!("{}: {error}", paths.db_path.display()))
        })?;

        let records = store.count().await.map_err(|error| {
            SearchError::DatabaseUnavailable(format!("{}: {error}", paths.db_path.display()))
        })?;

        if usize::try_from(records).ok() != Some(index.len()) {
            error!(
                collection = %paths.name,
                records,
                rows = index.len(),
                "metadata store and vector index disagree on size"
            );
        }

        Ok(Self {
            name: paths.name.clone(),
            index,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub async fn record(&self, offset: usize) -> Result<Option<DocumentRecord>, SearchError> {
        let Ok(id) = i64::try_from(offset) else {
            return Ok(None);
        };
        Ok(self.store.get(id).await?)
    }

    pub async fn records(&self) -> Result<Vec<DocumentRecord>, SearchError> {
        Ok(self.store.all().await?)
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}
