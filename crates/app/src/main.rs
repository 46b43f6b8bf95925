use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use doc_qa_core::{
    evaluate, load_cases, normalize_answer, rebuild_snapshot, serve, ApiState, Answerer,
    CallPolicy, CharacterNgramEmbedder, Embedder, FlatIndex, IngestionOptions,
    NormalizationPolicy, OllamaEmbedder, OllamaGenerator, RagPipeline, RetrievalOptions,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-qa", version, about = "Document question answering over a local vector index")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the vector index snapshot
    #[arg(long, env = "DOC_QA_INDEX_DIR", default_value = "vector_index", global = true)]
    index_dir: PathBuf,

    /// Base URL of the Ollama-compatible model server
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434", global = true)]
    ollama_url: String,

    /// Which embedder turns text into vectors
    #[arg(long, env = "DOC_QA_EMBEDDER", value_enum, default_value_t = EmbedderKind::Ollama, global = true)]
    embedder: EmbedderKind,

    /// Embedding model served by the model server
    #[arg(long, env = "DOC_QA_EMBEDDING_MODEL", default_value = "all-minilm", global = true)]
    embedding_model: String,

    /// Output dimensionality of the embedding model
    #[arg(long, env = "DOC_QA_EMBEDDING_DIMENSIONS", default_value = "384", global = true)]
    embedding_dimensions: usize,

    /// Language model used to generate answers
    #[arg(long, env = "DOC_QA_GENERATION_MODEL", default_value = "llama3.1", global = true)]
    generation_model: String,

    /// Timeout for each model server call, in seconds
    #[arg(long, env = "DOC_QA_MODEL_TIMEOUT_SECS", default_value = "60", global = true)]
    model_timeout_secs: u64,

    /// Extra attempts for a model call that failed transiently
    #[arg(long, env = "DOC_QA_MODEL_RETRIES", default_value = "1", global = true)]
    model_retries: u32,

    /// Pause before retrying a model call, in milliseconds
    #[arg(long, env = "DOC_QA_RETRY_BACKOFF_MS", default_value = "500", global = true)]
    retry_backoff_ms: u64,

    /// Number of chunks retrieved per question
    #[arg(long, env = "DOC_QA_TOP_K", default_value = "3", global = true)]
    top_k: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Sentence embeddings from the model server.
    Ollama,
    /// Offline hashed character trigrams.
    CharTrigram,
}

#[derive(Subcommand)]
enum Command {
    /// Load, chunk and embed a folder, then replace the index snapshot.
    Ingest {
        /// Folder searched recursively for txt, pdf, docx and csv files.
        #[arg(long, default_value = "data/raw")]
        folder: PathBuf,
        #[arg(long, env = "DOC_QA_CHUNK_MAX_CHARS", default_value = "700")]
        chunk_max_chars: usize,
        #[arg(long, env = "DOC_QA_CHUNK_OVERLAP_CHARS", default_value = "150")]
        chunk_overlap_chars: usize,
        /// standard or strict
        #[arg(long, env = "DOC_QA_NORMALIZATION", default_value = "standard")]
        normalization: NormalizationPolicy,
        #[arg(long, env = "DOC_QA_EMBED_BATCH_SIZE", default_value = "32")]
        embed_batch_size: usize,
    },
    /// Serve the HTTP API and the web page.
    Serve {
        #[arg(long, env = "DOC_QA_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        /// Upper bound on answering one question, in seconds.
        #[arg(long, env = "DOC_QA_REQUEST_TIMEOUT_SECS", default_value = "120")]
        request_timeout_secs: u64,
    },
    /// Answer a single question from the command line.
    Ask {
        #[arg(long)]
        question: String,
        /// Also print the retrieved context passages.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Run a labelled question set through the pipeline and score it.
    Evaluate {
        #[arg(long, default_value = "evaluation/eval_data.json")]
        data: PathBuf,
        /// Write the full report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn call_policy(&self) -> anyhow::Result<CallPolicy> {
        let policy = CallPolicy {
            timeout: Duration::from_secs(self.model_timeout_secs),
            max_retries: self.model_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        };
        policy.validate()?;
        Ok(policy)
    }

    fn build_embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        Ok(match self.embedder {
            EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
                &self.ollama_url,
                self.embedding_model.clone(),
                self.embedding_dimensions,
                self.call_policy()?,
            )?),
            EmbedderKind::CharTrigram => {
                Arc::new(CharacterNgramEmbedder::new(self.embedding_dimensions))
            }
        })
    }

    fn build_pipeline(&self) -> anyhow::Result<Arc<dyn Answerer>> {
        let retrieval = RetrievalOptions { top_k: self.top_k };
        retrieval.validate()?;

        let embedder = self.build_embedder()?;
        let index = FlatIndex::load(&self.index_dir, &embedder.model_info()).with_context(|| {
            format!(
                "loading index from {} (run `doc-qa ingest` first)",
                self.index_dir.display()
            )
        })?;
        let generator =
            OllamaGenerator::new(&self.ollama_url, self.generation_model.clone(), self.call_policy()?)?;

        info!(
            index_dir = %self.index_dir.display(),
            embedder = %embedder.model_info(),
            generator = %generator.model(),
            top_k = retrieval.top_k,
            "pipeline ready"
        );
        Ok(Arc::new(RagPipeline::new(embedder, index, generator, retrieval)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("reading .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-qa boot"
    );

    match &cli.command {
        Command::Ingest {
            folder,
            chunk_max_chars,
            chunk_overlap_chars,
            normalization,
            embed_batch_size,
        } => {
            let options = IngestionOptions {
                chunk_max_chars: *chunk_max_chars,
                chunk_overlap_chars: *chunk_overlap_chars,
                normalization: *normalization,
                embed_batch_size: *embed_batch_size,
            };
            options.validate()?;
            tokio::select! {
                result = run_ingest(&cli, folder, &options) => result?,
                _ = tokio::signal::ctrl_c() => {
                    warn!(index_dir = %cli.index_dir.display(), "ingest interrupted; snapshot left unchanged");
                    anyhow::bail!("ingest interrupted");
                }
            }
        }
        Command::Serve {
            bind,
            request_timeout_secs,
        } => {
            let answerer = cli.build_pipeline()?;
            let state = ApiState::new(answerer)
                .with_request_timeout(Duration::from_secs((*request_timeout_secs).max(1)));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            info!(address = %bind, "open http://{bind}/ui for the web page");
            serve(listener, state, shutdown_signal()).await?;
        }
        Command::Ask {
            question,
            show_context,
        } => {
            let answerer = cli.build_pipeline()?;
            let result = answerer.answer(question).await?;
            println!("{}", normalize_answer(&result.answer));
            if *show_context {
                for (rank, context) in result.contexts.iter().enumerate() {
                    println!("\n[context {}]\n{context}", rank + 1);
                }
            }
        }
        Command::Evaluate { data, output } => {
            let cases = load_cases(data)
                .with_context(|| format!("reading evaluation data {}", data.display()))?;
            let answerer = cli.build_pipeline()?;
            let report = evaluate(answerer.as_ref(), &cases).await;

            println!(
                "questions={} answered={} failed={} mean_context_recall={:.3} mean_answer_recall={:.3}",
                report.records.len(),
                report.answered,
                report.failed,
                report.mean_context_recall,
                report.mean_answer_recall
            );
            match output {
                Some(path) => {
                    report.save(path)?;
                    println!("report written to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}

async fn run_ingest(cli: &Cli, folder: &Path, options: &IngestionOptions) -> anyhow::Result<()> {
    let embedder = cli.build_embedder()?;
    let (manifest, report) = rebuild_snapshot(folder, &cli.index_dir, options, embedder.as_ref()).await?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            folder.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }
    }
    for warning in &report.warnings {
        warn!(source = %warning.source, message = %warning.message, "ingestion warning");
    }

    if report.chunks == 0 {
        println!("0 chunks indexed (no readable content)");
    }

    println!(
        "{} files, {} documents, {} chunks indexed into {} at {} ({} unsupported files ignored)",
        report.files_loaded,
        report.documents,
        manifest.chunk_count,
        cli.index_dir.display(),
        manifest.created_at.to_rfc3339(),
        report.unsupported_files.len()
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(error) => {
            warn!(error = %error, "ctrl-c handler unavailable; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
