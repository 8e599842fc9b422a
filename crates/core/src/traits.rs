use crate::{Assessment, DocumentRecord, SearchError};
use async_trait::async_trait;
use std::path::Path;

/// Produces the plain text of one document. Failures are absorbed and
/// reported as an empty string so a batch never aborts on a single file.
pub trait TextSource {
    fn extract_text(&self, path: &Path) -> String;
}

/// External relevance judge used for deep analysis.
#[async_trait]
pub trait ScoringOracle {
    /// Returns the oracle's raw, possibly chatty, text output.
    async fn assess(&self, query: &str, candidate: &DocumentRecord) -> Result<String, SearchError>;

    fn model(&self) -> &str;

    /// Parses the raw output into an [`Assessment`].
    fn parse(&self, raw: &str) -> Result<Assessment, SearchError> {
        crate::oracle::parse_oracle_response(raw)
    }
}
