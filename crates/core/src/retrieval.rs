use crate::collection::Collection;
use crate::embeddings::Embedder;
use crate::oracle::DEFAULT_ORACLE_TIMEOUT;
use crate::traits::ScoringOracle;
use crate::vector_index::Neighbor;
use crate::{Assessment, Candidate, RankedCandidate, SearchError, SearchQuery, SearchResponse};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub preview_chars: usize,
    pub oracle_timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            preview_chars: 300,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    oracle: Option<Arc<dyn ScoringOracle + Send + Sync>>,
    options: RetrievalOptions,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, options: RetrievalOptions) -> Self {
        Self {
            embedder,
            oracle: None,
            options,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ScoringOracle + Send + Sync>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub async fn search(
        &self,
        collection: &Collection,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let oracle = if query.deep_analysis {
            let oracle = self.oracle.as_ref().ok_or_else(|| {
                SearchError::Request("deep analysis requested without a scoring oracle".to_string())
            })?;
            Some(oracle)
        } else {
            None
        };

        let active = self.embedder.model_id();
        if collection.index().model_id() != active {
            return Err(SearchError::EmbedderMismatch {
                indexed: collection.index().model_id().to_string(),
                active,
            });
        }

        let query_vector = self.embedder.embed_query(&query.text).await?;
        let neighbors = collection
            .index()
            .search(&query_vector, query.fetch_count())?;
        debug!(collection = collection.name(), hits = neighbors.len(), "index searched");

        let candidates = self.join_records(collection, &neighbors, query).await?;

        let candidates = match oracle {
            Some(oracle) => self.analyze(oracle.as_ref(), &query.text, candidates).await,
            None => candidates
                .into_iter()
                .map(|candidate| self.preview(candidate))
                .collect(),
        };

        Ok(SearchResponse {
            query: query.text.clone(),
            analyzed: query.deep_analysis,
            candidates,
        })
    }

    async fn join_records(
        &self,
        collection: &Collection,
        neighbors: &[Neighbor],
        query: &SearchQuery,
    ) -> Result<Vec<Candidate>, SearchError> {
        let mut candidates = Vec::with_capacity(query.top_k);

        for neighbor in neighbors {
            let Some(record) = collection.record(neighbor.offset).await? else {
                error!(
                    collection = collection.name(),
                    offset = neighbor.offset,
                    "index row has no metadata record, skipping"
                );
                continue;
            };

            if let Some(stream) = &query.stream {
                if &record.stream != stream {
                    continue;
                }
            }

            candidates.push(Candidate {
                record,
                distance: neighbor.distance,
            });
            if candidates.len() >= query.top_k {
                break;
            }
        }

        Ok(candidates)
    }

    fn preview(&self, candidate: Candidate) -> RankedCandidate {
        let mut preview: String = candidate
            .record
            .extracted_text
            .chars()
            .take(self.options.preview_chars)
            .collect();
        preview.push_str("...");

        RankedCandidate {
            id: candidate.record.id,
            candidate_name: candidate.record.candidate_name,
            file_path: candidate.record.file_path,
            stream: candidate.record.stream,
            distance: candidate.distance,
            preview: Some(preview),
            assessment: None,
        }
    }

    /// Scores every candidate concurrently and re-ranks by score. The sort is
    /// stable, so equal scores keep distance order.
    async fn analyze(
        &self,
        oracle: &(dyn ScoringOracle + Send + Sync),
        query: &str,
        candidates: Vec<Candidate>,
    ) -> Vec<RankedCandidate> {
        let assessments = join_all(
            candidates
                .iter()
                .map(|candidate| self.assess_one(oracle, query, candidate)),
        )
        .await;

        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .zip(assessments)
            .map(|(candidate, assessment)| RankedCandidate {
                id: candidate.record.id,
                candidate_name: candidate.record.candidate_name,
                file_path: candidate.record.file_path,
                stream: candidate.record.stream,
                distance: candidate.distance,
                preview: None,
                assessment: Some(assessment),
            })
            .collect();

        ranked.sort_by(|left, right| {
            let left = left.score().unwrap_or_default();
            let right = right.score().unwrap_or_default();
            right.total_cmp(&left)
        });
        ranked
    }

    async fn assess_one(
        &self,
        oracle: &(dyn ScoringOracle + Send + Sync),
        query: &str,
        candidate: &Candidate,
    ) -> Assessment {
        let record = &candidate.record;
        let timeout = self.options.oracle_timeout;

        let outcome = match tokio::time::timeout(timeout, oracle.assess(query, record)).await {
            Ok(Ok(raw)) => oracle.parse(&raw),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(SearchError::Timeout(timeout)),
        };

        outcome.unwrap_or_else(|error| {
            warn!(
                resume_id = record.id,
                model = oracle.model(),
                %error,
                "candidate analysis failed"
            );
            Assessment::failed(record.id, &record.candidate_name, error)
        })
    }
}
