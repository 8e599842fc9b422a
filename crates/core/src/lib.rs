pub mod collection;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod names;
pub mod oracle;
pub mod retrieval;
pub mod store;
pub mod traits;
pub mod vector_index;

pub use collection::{
    is_valid_collection_name, Collection, CollectionPaths, CollectionSummary, CollectionWriter,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaConfig, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, SearchError};
pub use extractor::{
    ExtractorOptions, LopdfExtractor, OcrEngine, OcrToolConfig, PageRenderer, PageText,
    PdfExtractor, PdftoppmRenderer, TesseractOcr, TextExtractor,
};
#[cfg(feature = "ocr")]
pub use extractor::LeptessOcr;
pub use ingest::{discover_pdf_files, IngestionPipeline, IngestionReport, SkippedPdf};
pub use models::{
    Assessment, Candidate, DocumentRecord, IngestionOptions, PendingDocument, RankedCandidate,
    SearchQuery, SearchResponse, DEFAULT_STREAM, UNKNOWN_CANDIDATE,
};
pub use names::{title_case, NameHeuristic};
pub use oracle::{
    parse_oracle_response, OllamaOracle, DEFAULT_ORACLE_MODEL, DEFAULT_ORACLE_TIMEOUT,
};
pub use retrieval::{RetrievalOptions, RetrievalService};
pub use store::MetadataStore;
pub use traits::{ScoringOracle, TextSource};
pub use vector_index::{FlatL2Index, Neighbor};
