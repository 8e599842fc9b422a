use crate::collection::{CollectionPaths, CollectionSummary, CollectionWriter};
use crate::embeddings::Embedder;
use crate::names::NameHeuristic;
use crate::traits::TextSource;
use crate::{IngestError, IngestionOptions, PendingDocument};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = if recursive {
        WalkDir::new(folder)
    } else {
        WalkDir::new(folder).max_depth(1)
    };

    for entry in walker.into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestionReport {
    pub discovered: usize,
    pub batches: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub collection: CollectionSummary,
}

impl IngestionReport {
    pub fn records_written(&self) -> usize {
        self.collection.record_count
    }
}

/// Extract → name → embed → append, one batch at a time.
pub struct IngestionPipeline {
    source: Arc<dyn TextSource + Send + Sync>,
    embedder: Arc<dyn Embedder>,
    names: NameHeuristic,
    options: IngestionOptions,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn TextSource + Send + Sync>,
        embedder: Arc<dyn Embedder>,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        if options.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            source,
            embedder,
            names: NameHeuristic::new()?,
            options,
        })
    }

    pub async fn ingest_folder(
        &self,
        folder: &Path,
        target: CollectionPaths,
    ) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder, self.options.recursive);
        info!(folder = %folder.display(), files = files.len(), "discovered pdf files");
        self.ingest_files(&files, target).await
    }

    pub async fn ingest_files(
        &self,
        files: &[PathBuf],
        target: CollectionPaths,
    ) -> Result<IngestionReport, IngestError> {
        if files.is_empty() {
            return Err(IngestError::NoDataProcessed(format!(
                "no pdf files given for {}",
                target.name
            )));
        }

        let mut writer =
            CollectionWriter::create(target, self.embedder.dimensions(), self.embedder.model_id())
                .await?;

        let mut skipped_files = Vec::new();
        let mut batches = 0;
        if let Err(error) = self
            .run_batches(files, &mut writer, &mut skipped_files, &mut batches)
            .await
        {
            writer.abort().await;
            return Err(error);
        }

        let collection = writer.finish().await?;
        info!(
            collection = %collection.name,
            records = collection.record_count,
            skipped = skipped_files.len(),
            "ingestion complete"
        );

        Ok(IngestionReport {
            discovered: files.len(),
            batches,
            skipped_files,
            collection,
        })
    }

    async fn run_batches(
        &self,
        files: &[PathBuf],
        writer: &mut CollectionWriter,
        skipped_files: &mut Vec<SkippedPdf>,
        batches: &mut usize,
    ) -> Result<(), IngestError> {
        for (batch_no, batch) in files.chunks(self.options.batch_size).enumerate() {
            *batches += 1;
            info!(batch = batch_no + 1, files = batch.len(), "processing batch");

            let mut documents = Vec::with_capacity(batch.len());
            for path in batch {
                match self.prepare_document(path) {
                    Some(document) => documents.push(document),
                    None => skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: "no text could be extracted".to_string(),
                    }),
                }
            }

            if documents.is_empty() {
                warn!(batch = batch_no + 1, "no valid text extracted from batch");
                continue;
            }

            let texts: Vec<String> = documents.iter().map(|doc| doc.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|error| IngestError::Embedding(error.to_string()))?;

            let ids = writer.append(documents, vectors).await?;
            info!(
                batch = batch_no + 1,
                first_id = ids.start,
                total = writer.next_id(),
                "batch stored"
            );
        }

        Ok(())
    }

    fn prepare_document(&self, path: &Path) -> Option<PendingDocument> {
        let text = run_blocking(|| self.source.extract_text(path));
        if text.trim().is_empty() {
            return None;
        }

        let text: String = text.chars().take(self.options.max_text_chars).collect();
        let candidate_name = self.names.guess(&text);

        Some(PendingDocument {
            file_path: path.to_string_lossy().to_string(),
            stream: self.options.stream.clone(),
            candidate_name,
            text,
            timestamp: Utc::now(),
        })
    }
}

/// Extraction shells out to OCR tools, so keep it off the async workers when
/// the runtime allows it. The current-thread runtime cannot hand its core
/// away, so there the closure runs in place.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::SearchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    struct MapSource(HashMap<PathBuf, String>);

    impl TextSource for MapSource {
        fn extract_text(&self, path: &Path) -> String {
            self.0.get(path).cloned().unwrap_or_default()
        }
    }

    /// Blocks its thread until a task it spawned gets to run elsewhere.
    struct StallingSource {
        released: Arc<AtomicBool>,
    }

    impl TextSource for StallingSource {
        fn extract_text(&self, _path: &Path) -> String {
            let released = Arc::clone(&self.released);
            Handle::current().spawn(async move { released.store(true, Ordering::SeqCst) });

            let deadline = Instant::now() + Duration::from_secs(2);
            while !self.released.load(Ordering::SeqCst) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            "Victoria Clark\nData scientist".to_string()
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        fn model_id(&self) -> String {
            "broken".to_string()
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Err(SearchError::Request("encoder offline".to_string()))
        }
    }

    fn pipeline(source: MapSource, batch_size: usize) -> IngestionPipeline {
        IngestionPipeline::new(
            Arc::new(source),
            Arc::new(CharacterNgramEmbedder::default()),
            IngestionOptions {
                batch_size,
                ..IngestionOptions::default()
            },
        )
        .expect("valid options")
    }

    #[test]
    fn discover_pdf_files_respects_depth() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.PDF")).and_then(|mut file| file.write_all(b"%PDF-1.4"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"x"))?;
        File::create(nested.join("b.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4"))?;

        assert_eq!(discover_pdf_files(base, false).len(), 1);
        assert_eq!(discover_pdf_files(base, true).len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn empty_documents_are_skipped_and_ids_stay_dense(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let files: Vec<PathBuf> = ["a.pdf", "b.pdf", "c.pdf"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        let source = MapSource(HashMap::from([
            (files[0].clone(), "DANA LOWELL\nRust engineer".to_string()),
            (files[1].clone(), "   ".to_string()),
            (files[2].clone(), "Victoria Clark\nData scientist".to_string()),
        ]));

        let target = CollectionPaths::new(dir.path(), "hires")?;
        let report = pipeline(source, 2).ingest_files(&files, target.clone()).await?;

        assert_eq!(report.discovered, 3);
        assert_eq!(report.batches, 2);
        assert_eq!(report.records_written(), 2);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].path, files[1]);

        let collection = Collection::open(&target).await?;
        let records = collection.records().await?;
        let summary: Vec<(i64, &str)> = records
            .iter()
            .map(|record| (record.id, record.candidate_name.as_str()))
            .collect();
        assert_eq!(summary, vec![(0, "Dana Lowell"), (1, "Victoria Clark")]);
        assert_eq!(collection.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn text_is_capped_before_naming_and_storage() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("long.pdf");
        let body = format!("JANE ROE\n{}", "é".repeat(5_000));
        let source = MapSource(HashMap::from([(file.clone(), body)]));

        let target = CollectionPaths::new(dir.path(), "long")?;
        pipeline(source, 50).ingest_files(&[file], target.clone()).await?;

        let collection = Collection::open(&target).await?;
        let record = collection.record(0).await?.expect("first record exists");
        assert_eq!(record.extracted_text.chars().count(), 2_000);
        assert_eq!(record.candidate_name, "Jane Roe");
        Ok(())
    }

    #[tokio::test]
    async fn all_empty_extraction_persists_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let files = vec![dir.path().join("scan.pdf")];
        let target = CollectionPaths::new(dir.path(), "blank")?;

        let result = pipeline(MapSource(HashMap::new()), 50)
            .ingest_files(&files, target.clone())
            .await;

        assert!(matches!(result, Err(IngestError::NoDataProcessed(_))));
        assert!(!target.exists());
        Ok(())
    }

    #[tokio::test]
    async fn no_files_is_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = CollectionPaths::new(dir.path(), "none")?;

        let result = pipeline(MapSource(HashMap::new()), 50)
            .ingest_folder(dir.path(), target.clone())
            .await;

        assert!(matches!(result, Err(IngestError::NoDataProcessed(_))));
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_aborts_without_artifacts() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let file = dir.path().join("a.pdf");
        let source = MapSource(HashMap::from([(file.clone(), "Some Person".to_string())]));
        let target = CollectionPaths::new(dir.path(), "down")?;

        let pipeline = IngestionPipeline::new(
            Arc::new(source),
            Arc::new(BrokenEmbedder),
            IngestionOptions::default(),
        )?;
        let result = pipeline.ingest_files(&[file], target.clone()).await;

        assert!(matches!(result, Err(IngestError::Embedding(_))));
        assert!(!target.exists());
        Ok(())
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = IngestionPipeline::new(
            Arc::new(MapSource(HashMap::new())),
            Arc::new(CharacterNgramEmbedder::default()),
            IngestionOptions {
                batch_size: 0,
                ..IngestionOptions::default()
            },
        );
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn extraction_leaves_the_worker_free() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let released = Arc::new(AtomicBool::new(false));
        let pipeline = IngestionPipeline::new(
            Arc::new(StallingSource {
                released: Arc::clone(&released),
            }),
            Arc::new(CharacterNgramEmbedder::default()),
            IngestionOptions::default(),
        )?;
        let files = vec![dir.path().join("slow.pdf")];
        let target = CollectionPaths::new(dir.path(), "slow")?;

        let report = tokio::spawn(async move { pipeline.ingest_files(&files, target).await })
            .await??;

        assert_eq!(report.records_written(), 1);
        assert!(released.load(Ordering::SeqCst));
        Ok(())
    }
}
