use crate::traits::ScoringOracle;
use crate::{Assessment, DocumentRecord, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ORACLE_MODEL: &str = "gemma3:4b";
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Pulls the outermost `{ ... }` span out of free-form model output and
/// decodes it. This is the single place that knows the oracle's text shape.
pub fn parse_oracle_response(raw: &str) -> Result<Assessment, SearchError> {
    let span = raw
        .find('{')
        .zip(raw.rfind('}'))
        .filter(|(start, end)| start < end);

    let Some((start, end)) = span else {
        return Err(SearchError::BackendResponse {
            backend: "oracle".to_string(),
            details: "no json object in response".to_string(),
        });
    };

    Ok(serde_json::from_str(&raw[start..=end])?)
}

pub fn build_prompt(job_description: &str, candidate: &DocumentRecord) -> String {
    let template = json!({
        "resume_id": candidate.id,
        "candidate_name": candidate.candidate_name,
        "match_score": 0,
        "strengths": [],
        "gaps": [],
        "summary": "",
    });
    let template = serde_json::to_string_pretty(&template).unwrap_or_default();

    format!(
        "You are an AI recruitment assistant.\n\n\
         Job Description:\n{job_description}\n\n\
         Candidate Name: {name}\n\n\
         Candidate Resume:\n{resume}\n\n\
         Analyze the resume and respond ONLY in valid JSON:\n\n{template}\n",
        name = candidate.candidate_name,
        resume = candidate.extracted_text,
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Scores candidates through an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaOracle {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaOracle {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: Url::parse(base_url)?.join("/api/generate")?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ScoringOracle for OllamaOracle {
    async fn assess(&self, query: &str, candidate: &DocumentRecord) -> Result<String, SearchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                model: &self.model,
                prompt: build_prompt(query, candidate),
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?;

        let payload: GenerateResponse = response.json().await?;
        Ok(payload.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn chatty_output_is_trimmed_to_the_json_object() -> Result<(), Box<dyn std::error::Error>> {
        let raw = "Sure! Here is my analysis:\n```json\n{\"resume_id\": 4, \"candidate_name\": \"Dana Lowell\", \
                   \"match_score\": 82.5, \"strengths\": [\"Rust\"], \"gaps\": [], \"summary\": \"Strong {fit}\"}\n```\nThanks.";

        let assessment = parse_oracle_response(raw)?;

        assert_eq!(assessment.resume_id, 4);
        assert_eq!(assessment.match_score, 82.5);
        assert_eq!(assessment.strengths, vec!["Rust".to_string()]);
        assert_eq!(assessment.summary, "Strong {fit}");
        Ok(())
    }

    #[test]
    fn missing_score_defaults_to_zero() -> Result<(), Box<dyn std::error::Error>> {
        let assessment = parse_oracle_response("{\"summary\": \"no idea\"}")?;
        assert_eq!(assessment.match_score, 0.0);
        assert!(assessment.gaps.is_empty());
        Ok(())
    }

    #[test]
    fn sloppy_side_fields_keep_the_score() -> Result<(), Box<dyn std::error::Error>> {
        let raw = "{\"resume_id\": \"4\", \"candidate_name\": null, \"match_score\": 85, \
                   \"strengths\": null, \"gaps\": \"none\", \"summary\": 3}";

        let assessment = parse_oracle_response(raw)?;

        assert_eq!(assessment.resume_id, 4);
        assert_eq!(assessment.match_score, 85.0);
        assert!(assessment.candidate_name.is_empty());
        assert!(assessment.strengths.is_empty());
        assert!(assessment.gaps.is_empty());
        assert!(assessment.summary.is_empty());
        Ok(())
    }

    #[test]
    fn numeric_string_and_null_scores() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(parse_oracle_response("{\"match_score\": \"72.5\"}")?.match_score, 72.5);
        assert_eq!(parse_oracle_response("{\"match_score\": null}")?.match_score, 0.0);
        Ok(())
    }

    #[test]
    fn output_without_object_is_an_error() {
        assert!(parse_oracle_response("I cannot help with that").is_err());
        assert!(parse_oracle_response("} backwards {").is_err());
        assert!(parse_oracle_response("{\"match_score\": \"high\"}").is_err());
    }

    #[test]
    fn prompt_carries_candidate_identity() {
        let record = DocumentRecord {
            id: 9,
            file_path: "/in/dana.pdf".to_string(),
            stream: "AllResumes".to_string(),
            candidate_name: "Dana Lowell".to_string(),
            extracted_text: "Rust, Kafka, Postgres".to_string(),
            timestamp: Utc::now(),
        };

        let prompt = build_prompt("Backend engineer", &record);

        assert!(prompt.contains("Job Description:\nBackend engineer"));
        assert!(prompt.contains("Candidate Name: Dana Lowell"));
        assert!(prompt.contains("\"resume_id\": 9"));
        assert!(prompt.contains("Rust, Kafka, Postgres"));
    }
}
