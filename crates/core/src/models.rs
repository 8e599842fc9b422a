use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_STREAM: &str = "AllResumes";
pub const UNKNOWN_CANDIDATE: &str = "Unknown";

/// A persisted resume row. `id` doubles as the row offset in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentRecord {
    pub id: i64,
    pub file_path: String,
    pub stream: String,
    pub candidate_name: String,
    pub extracted_text: String,
    #[sqlx(rename = "ocr_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A document that survived extraction and is waiting for its id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDocument {
    pub file_path: String,
    pub stream: String,
    pub candidate_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingDocument {
    pub fn into_record(self, id: i64) -> DocumentRecord {
        DocumentRecord {
            id,
            file_path: self.file_path,
            stream: self.stream,
            candidate_name: self.candidate_name,
            extracted_text: self.text,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub text: String,
    pub top_k: usize,
    pub deep_analysis: bool,
    pub stream: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            deep_analysis: false,
            stream: None,
        }
    }

    pub fn with_deep_analysis(mut self, enabled: bool) -> Self {
        self.deep_analysis = enabled;
        self
    }

    pub fn with_stream(mut self, stream: Option<String>) -> Self {
        self.stream = stream;
        self
    }

    /// How many rows to pull from the index before stream filtering.
    pub fn fetch_count(&self) -> usize {
        if self.stream.is_some() {
            self.top_k.saturating_mul(2)
        } else {
            self.top_k
        }
    }
}

/// Structured verdict returned by the scoring oracle. Only `match_score` has
/// to be readable; the other fields fall back to their defaults when the model
/// sends `null` or the wrong type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(default, deserialize_with = "lenient_id")]
    pub resume_id: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub candidate_name: String,
    #[serde(default, deserialize_with = "lenient_score")]
    pub match_score: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub gaps: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: String,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(id.unwrap_or_default())
}

/// Numbers and numeric strings are scores, `null` is zero, anything else is
/// unreadable.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0.0),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| D::Error::custom("match_score out of range")),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("match_score {text:?} is not a number"))),
        other => Err(D::Error::custom(format!("match_score {other} is not a number"))),
    }
}

impl Assessment {
    pub fn failed(resume_id: i64, candidate_name: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            resume_id,
            candidate_name: candidate_name.to_string(),
            match_score: 0.0,
            strengths: Vec::new(),
            gaps: Vec::new(),
            summary: format!("Error analyzing: {reason}"),
        }
    }
}

/// A record joined with its distance to the query. Lives for one query only.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: DocumentRecord,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: i64,
    pub candidate_name: String,
    pub file_path: String,
    pub stream: String,
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Assessment>,
}

impl RankedCandidate {
    pub fn score(&self) -> Option<f64> {
        self.assessment.as_ref().map(|assessment| assessment.match_score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub analyzed: bool,
    pub candidates: Vec<RankedCandidate>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub batch_size: usize,
    pub max_text_chars: usize,
    pub stream: String,
    pub recursive: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_text_chars: 2_000,
            stream: DEFAULT_STREAM.to_string(),
            recursive: false,
        }
    }
}
