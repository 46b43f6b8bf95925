pub mod api;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use api::{app_router, normalize_answer, serve, ApiState, AskRequest, AskResponse};
pub use chunking::{chunk_document, chunk_documents, split_spans, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, IndexBuildError, IndexError, IngestError, ModelError, PipelineError,
};
pub use evaluation::{evaluate, load_cases, EvalCase, EvalRecord, EvaluationReport};
pub use extractor::{load_file, DocumentLoader, IngestWarning, LoadedFile, TableExtraction};
pub use generation::OllamaGenerator;
pub use ingest::{
    build_index, discover_files, load_folder, prepare_chunks, rebuild_snapshot, IngestionReport,
    LoadReport, SkippedFile,
};
pub use models::{
    Chunk, Document, DocumentKind, DocumentMetadata, EmbeddingModelInfo, IngestionOptions,
    NormalizationPolicy, RagAnswer, RetrievalOptions, ScoredChunk,
};
pub use normalize::{normalize_text, normalize_whitespace};
pub use orchestrator::RagPipeline;
pub use policy::CallPolicy;
pub use prompt::{build_prompt, FALLBACK_ANSWER};
pub use retrieval::Retriever;
pub use stores::{read_manifest, FlatIndex, SnapshotManifest};
pub use traits::{Answerer, Generator, VectorIndex};
