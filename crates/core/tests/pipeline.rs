use async_trait::async_trait;
use resume_search_core::{
    CharacterNgramEmbedder, Collection, CollectionPaths, DocumentRecord, Embedder,
    IngestionOptions, IngestionPipeline, RetrievalOptions, RetrievalService, ScoringOracle,
    SearchError, SearchQuery, TextSource,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FIXTURES: [(&str, &str); 6] = [
    ("01.pdf", "DANA LOWELL\nRust engineer building async network services with tokio"),
    ("02.pdf", "Victoria Clark\nPython developer with machine learning experience"),
    ("03.pdf", ""),
    ("04.pdf", "resume of omar haddad\nJava backend engineer with Spring Boot"),
    ("05.pdf", "Priya Natarajan Iyer Rao\nFrontend developer, React and TypeScript"),
    ("06.pdf", "1234\nnoise"),
];

struct FixtureSource(HashMap<PathBuf, String>);

impl FixtureSource {
    fn new(dir: &Path) -> (Self, Vec<PathBuf>) {
        let files: Vec<PathBuf> = FIXTURES.iter().map(|(name, _)| dir.join(name)).collect();
        let texts = files
            .iter()
            .zip(FIXTURES)
            .map(|(path, (_, text))| (path.clone(), text.to_string()))
            .collect();
        (Self(texts), files)
    }
}

impl TextSource for FixtureSource {
    fn extract_text(&self, path: &Path) -> String {
        self.0.get(path).cloned().unwrap_or_default()
    }
}

/// Likes whoever mentions Java, fails on anyone without a name.
struct KeywordOracle;

#[async_trait]
impl ScoringOracle for KeywordOracle {
    async fn assess(&self, query: &str, candidate: &DocumentRecord) -> Result<String, SearchError> {
        if candidate.candidate_name == "Unknown" {
            return Err(SearchError::Request("model overloaded".to_string()));
        }
        let score = if candidate.extracted_text.contains("Java") { 88 } else { 12 };
        Ok(format!(
            "Analysis for {query}:\n{{\"resume_id\": {}, \"candidate_name\": \"{}\", \"match_score\": {score}, \
             \"strengths\": [], \"gaps\": [], \"summary\": \"scored\"}}",
            candidate.id, candidate.candidate_name
        ))
    }

    fn model(&self) -> &str {
        "keyword"
    }
}

async fn ingest(dir: &Path, name: &str, batch_size: usize) -> Result<CollectionPaths, Box<dyn std::error::Error>> {
    let (source, files) = FixtureSource::new(dir);
    let pipeline = IngestionPipeline::new(
        Arc::new(source),
        Arc::new(CharacterNgramEmbedder::default()),
        IngestionOptions {
            batch_size,
            ..IngestionOptions::default()
        },
    )?;
    let target = CollectionPaths::new(dir, name)?;
    pipeline.ingest_files(&files, target.clone()).await?;
    Ok(target)
}

#[tokio::test]
async fn ids_match_index_rows_after_ingestion() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let target = ingest(dir.path(), "pool", 50).await?;

    let collection = Collection::open(&target).await?;
    let records = collection.records().await?;

    assert_eq!(records.len(), 5);
    assert_eq!(collection.len(), 5);
    let ids: Vec<i64> = records.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    let names: Vec<&str> = records
        .iter()
        .map(|record| record.candidate_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "Dana Lowell",
            "Victoria Clark",
            "Omar Haddad",
            "Priya Natarajan Iyer",
            "Unknown",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn batch_size_does_not_change_contents() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let single = Collection::open(&ingest(dir.path(), "single", 1).await?).await?;
    let bulk = Collection::open(&ingest(dir.path(), "bulk", 50).await?).await?;

    let strip = |records: Vec<DocumentRecord>| {
        records
            .into_iter()
            .map(|record| (record.id, record.candidate_name, record.extracted_text, record.file_path))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(single.records().await?), strip(bulk.records().await?));

    for row in 0..single.len() {
        let left = single.index().vector(row).expect("row exists");
        let right = bulk.index().vector(row).expect("row exists");
        assert!(left.iter().zip(right).all(|(a, b)| (a - b).abs() < 1e-6));
    }
    Ok(())
}

#[tokio::test]
async fn document_text_finds_itself() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let target = ingest(dir.path(), "pool", 2).await?;
    let collection = Collection::open(&target).await?;
    let embedder: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::default());
    let service = RetrievalService::new(embedder, RetrievalOptions::default());

    for record in collection.records().await? {
        let response = service
            .search(&collection, &SearchQuery::new(record.extracted_text.clone(), 1))
            .await?;
        assert_eq!(response.candidates[0].id, record.id);
        assert!(response.candidates[0].distance < 1e-5);
    }
    Ok(())
}

#[tokio::test]
async fn deep_analysis_reranks_and_keeps_failures() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let target = ingest(dir.path(), "pool", 50).await?;
    let collection = Collection::open(&target).await?;
    let service = RetrievalService::new(
        Arc::new(CharacterNgramEmbedder::default()),
        RetrievalOptions::default(),
    )
    .with_oracle(Arc::new(KeywordOracle));

    let query = SearchQuery::new("Python developer with machine learning experience", 5)
        .with_deep_analysis(true);
    let response = service.search(&collection, &query).await?;

    assert_eq!(response.candidates.len(), 5);
    assert_eq!(response.candidates[0].candidate_name, "Omar Haddad");
    assert_eq!(response.candidates[0].score(), Some(88.0));

    let unknown = response
        .candidates
        .iter()
        .find(|candidate| candidate.candidate_name == "Unknown")
        .expect("failing candidate is still returned");
    assert_eq!(unknown.score(), Some(0.0));

    let scores: Vec<f64> = response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.score())
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    Ok(())
}
