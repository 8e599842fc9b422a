mod naming;
mod registry;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use naming::sanitize_name;
use registry::Registry;
use resume_search_core::{
    CharacterNgramEmbedder, Collection, CollectionPaths, Embedder, IngestionOptions,
    IngestionPipeline, OcrToolConfig, OllamaConfig, OllamaEmbedder, OllamaOracle,
    RetrievalOptions, RetrievalService, SearchQuery, SearchResponse, TextExtractor,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_ORACLE_MODEL, DEFAULT_STREAM,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resume-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding collections and the registry
    #[arg(long, env = "RESUME_SEARCH_DATA_DIR", default_value = "databases")]
    data_dir: PathBuf,

    /// Ollama base URL, used for embeddings and deep analysis
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Embedding backend
    #[arg(long, env = "RESUME_SEARCH_EMBEDDER", value_enum, default_value_t = EmbedderKind::Ollama)]
    embedder: EmbedderKind,

    /// Embedding model served by Ollama
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Vector width produced by the embedding backend
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Generative model used for deep analysis
    #[arg(long, env = "ORACLE_MODEL", default_value = DEFAULT_ORACLE_MODEL)]
    oracle_model: String,

    /// Per-candidate deep analysis timeout
    #[arg(long, env = "ORACLE_TIMEOUT_SECS", default_value = "600")]
    oracle_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    /// Pretrained encoder behind Ollama's /api/embed.
    Ollama,
    /// Offline hashing embedder over character trigrams.
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Build a new collection from a folder of PDF resumes.
    Ingest {
        /// Folder that contains the PDFs.
        #[arg(long)]
        folder: PathBuf,
        /// Collection name.
        #[arg(long)]
        name: String,
        #[arg(long, env = "RESUME_SEARCH_OWNER", default_value = "default")]
        owner: String,
        /// Category label stored on every record.
        #[arg(long, default_value = DEFAULT_STREAM)]
        stream: String,
        #[arg(long, default_value = "50")]
        batch_size: usize,
        /// Walk subfolders too.
        #[arg(long, default_value_t = false)]
        recursive: bool,
    },
    /// Rank a collection's candidates against a job description.
    Search {
        /// Collection name.
        #[arg(long)]
        name: String,
        /// Job description or free-text query.
        #[arg(long)]
        query: String,
        #[arg(long, env = "RESUME_SEARCH_OWNER", default_value = "default")]
        owner: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Score each candidate with the generative model.
        #[arg(long, default_value_t = false)]
        deep: bool,
        /// Only keep candidates with this stream label.
        #[arg(long)]
        stream: Option<String>,
        /// Print the response as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the collections registered for an owner.
    List {
        #[arg(long, env = "RESUME_SEARCH_OWNER", default_value = "default")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "resume-search boot"
    );

    tokio::fs::create_dir_all(&cli.data_dir)
        .await
        .with_context(|| format!("creating {}", cli.data_dir.display()))?;
    let registry = Registry::open(&cli.data_dir.join("registry.db"))
        .await
        .context("opening collection registry")?;

    let result = run(&cli, &registry).await;
    registry.close().await;
    result
}

async fn run(cli: &Cli, registry: &Registry) -> anyhow::Result<()> {
    match &cli.command {
        Command::Ingest {
            folder,
            name,
            owner,
            stream,
            batch_size,
            recursive,
        } => {
            let owner = clean(owner, "owner")?;
            let name = clean(name, "collection name")?;
            if registry.find(&owner, &name).await?.is_some() {
                bail!("collection {name} already exists for {owner}");
            }

            let directory = cli.data_dir.join(&owner);
            tokio::fs::create_dir_all(&directory).await?;
            let target = CollectionPaths::new(&directory, &name)?;

            let pipeline = IngestionPipeline::new(
                Arc::new(TextExtractor::with_system_tools(OcrToolConfig::from_env())),
                build_embedder(cli)?,
                IngestionOptions {
                    batch_size: *batch_size,
                    stream: stream.clone(),
                    recursive: *recursive,
                    ..IngestionOptions::default()
                },
            )?;

            let report = pipeline.ingest_folder(folder, target).await?;
            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
            }

            let entry = registry
                .register_or_discard(&owner, &report.collection)
                .await?;
            println!(
                "{} resumes ingested into {} at {}",
                entry.record_count,
                entry.name,
                entry.created_at.to_rfc3339()
            );
        }
        Command::Search {
            name,
            query,
            owner,
            top_k,
            deep,
            stream,
            json,
        } => {
            let owner = clean(owner, "owner")?;
            let name = clean(name, "collection name")?;
            let entry = registry
                .find(&owner, &name)
                .await?
                .ok_or_else(|| anyhow!("no collection named {name} for {owner}"))?;

            let collection = Collection::open(&entry.paths()).await?;
            let timeout = Duration::from_secs(cli.oracle_timeout_secs);
            let mut service = RetrievalService::new(
                build_embedder(cli)?,
                RetrievalOptions {
                    oracle_timeout: timeout,
                    ..RetrievalOptions::default()
                },
            );
            if *deep {
                service = service.with_oracle(Arc::new(OllamaOracle::new(
                    &cli.ollama_url,
                    cli.oracle_model.clone(),
                    timeout,
                )?));
            }

            let search_query = SearchQuery::new(query.clone(), *top_k)
                .with_deep_analysis(*deep)
                .with_stream(stream.clone());
            let response = service.search(&collection, &search_query).await;
            collection.close().await;
            let response = response?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Command::List { owner } => {
            let owner = clean(owner, "owner")?;
            let entries = registry.list(&owner).await?;
            if entries.is_empty() {
                println!("no collections for {owner}");
            }
            for entry in entries {
                println!(
                    "{}  records={}  created_at={}  db={}",
                    entry.name,
                    entry.record_count,
                    entry.created_at.to_rfc3339(),
                    entry.db_path
                );
            }
        }
    }

    Ok(())
}

fn clean(raw: &str, what: &str) -> anyhow::Result<String> {
    sanitize_name(raw).ok_or_else(|| anyhow!("{what} {raw:?} has no usable characters"))
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderKind::Ollama => {
            let defaults = OllamaConfig::default();
            Arc::new(OllamaEmbedder::new(&OllamaConfig {
                base_url: cli.ollama_url.clone(),
                embedding_model: cli.embedding_model.clone(),
                dimensions: cli.embedding_dimensions.unwrap_or(defaults.dimensions),
                ..defaults
            })?)
        }
        EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: cli
                .embedding_dimensions
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        }),
    };
    info!(model = %embedder.model_id(), dimensions = embedder.dimensions(), "embedder ready");
    Ok(embedder)
}

fn print_response(response: &SearchResponse) {
    println!("query: {}", response.query);
    if response.candidates.is_empty() {
        println!("no candidates found");
    }

    for (rank, candidate) in response.candidates.iter().enumerate() {
        println!(
            "{}. {} id={} distance={:.4} stream={}",
            rank + 1,
            candidate.candidate_name,
            candidate.id,
            candidate.distance,
            candidate.stream
        );
        println!("  source={}", display_path(&candidate.file_path));

        if let Some(assessment) = &candidate.assessment {
            println!("  match_score={:.0}", assessment.match_score);
            println!("  summary: {}", assessment.summary);
            if !assessment.strengths.is_empty() {
                println!("  strengths: {}", assessment.strengths.join("; "));
            }
            if !assessment.gaps.is_empty() {
                println!("  gaps: {}", assessment.gaps.join("; "));
            }
        } else if let Some(preview) = &candidate.preview {
            println!("  preview:\n{preview}");
        }
    }
}

fn display_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
