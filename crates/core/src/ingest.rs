use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IndexBuildError, IngestError, ModelError};
use crate::extractor::{is_supported, load_file, IngestWarning};
use crate::models::{Chunk, Document, IngestionOptions, NormalizationPolicy};
use crate::normalize::normalize_text;
use crate::stores::{FlatIndex, SnapshotLock, SnapshotManifest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct DiscoveredFiles {
    pub supported: Vec<PathBuf>,
    pub unsupported: Vec<PathBuf>,
}

/// Walks `folder` recursively; both lists come back sorted.
pub fn discover_files(folder: &Path) -> Result<DiscoveredFiles, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "{} is not a directory",
            folder.display()
        )));
    }

    let mut files = DiscoveredFiles::default();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        if is_supported(&path) {
            files.supported.push(path);
        } else {
            files.unsupported.push(path);
        }
    }

    files.supported.sort_unstable();
    files.unsupported.sort_unstable();
    Ok(files)
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files_loaded: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub unsupported_files: Vec<PathBuf>,
    pub warnings: Vec<IngestWarning>,
}

/// Loads every supported file under `folder`.
///
/// A file that fails to load is recorded in `skipped_files` and the rest carry
/// on; only a folder without any supported file is an error.
pub fn load_folder(folder: &Path) -> Result<LoadReport, IngestError> {
    let files = discover_files(folder)?;

    if files.supported.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported files (txt, pdf, docx, csv) found in {}",
            folder.display()
        )));
    }

    for path in &files.unsupported {
        debug!(path = %path.display(), "skipping unsupported file");
    }

    let mut report = LoadReport {
        unsupported_files: files.unsupported,
        ..LoadReport::default()
    };

    for path in files.supported {
        match load_file(&path) {
            Ok(Some(loaded)) => {
                debug!(
                    path = %path.display(),
                    documents = loaded.documents.len(),
                    "loaded file"
                );
                report.files_loaded += 1;
                report.documents.extend(loaded.documents);
                report.warnings.extend(loaded.warnings);
            }
            Ok(None) => report.unsupported_files.push(path),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped file");
                report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Normalizes every document's content, dropping those left empty.
pub fn normalize_documents(documents: Vec<Document>, policy: NormalizationPolicy) -> Vec<Document> {
    documents
        .into_iter()
        .filter_map(|document| {
            let content = normalize_text(&document.content, policy);
            if content.is_empty() {
                debug!(source = %document.metadata.source, kind = %document.metadata.kind, "document empty after normalization");
                return None;
            }
            Some(Document::new(content, document.metadata))
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub files_loaded: usize,
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub unsupported_files: Vec<PathBuf>,
    pub warnings: Vec<IngestWarning>,
}

#[derive(Debug)]
pub struct PreparedChunks {
    pub chunks: Vec<Chunk>,
    pub report: IngestionReport,
}

/// Load, normalize and chunk everything under `folder`.
pub fn prepare_chunks(folder: &Path, options: &IngestionOptions) -> Result<PreparedChunks, IngestError> {
    let config = ChunkingConfig::try_from(options)?;
    let loaded = load_folder(folder)?;

    let documents = normalize_documents(loaded.documents, options.normalization);
    let chunks = chunk_documents(&documents, config);

    Ok(PreparedChunks {
        report: IngestionReport {
            files_loaded: loaded.files_loaded,
            documents: documents.len(),
            chunks: chunks.len(),
            skipped_files: loaded.skipped_files,
            unsupported_files: loaded.unsupported_files,
            warnings: loaded.warnings,
        },
        chunks,
    })
}

pub async fn embed_chunks<E>(
    embedder: &E,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, ModelError>
where
    E: Embedder + ?Sized,
{
    let mut vectors = Vec::with_capacity(chunks.len());

    for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<&str> = batch.iter().map(|chunk| chunk.content.as_str()).collect();
        let embedded = embedder.embed_batch(&texts).await?;
        if embedded.len() != texts.len() {
            return Err(ModelError::Malformed {
                backend: embedder.model_id().to_string(),
                details: format!(
                    "batch {batch_no}: expected {} embeddings, got {}",
                    texts.len(),
                    embedded.len()
                ),
            });
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Builds an in-memory index from every supported file under `folder`.
pub async fn build_index<E>(
    folder: &Path,
    options: &IngestionOptions,
    embedder: &E,
) -> Result<(FlatIndex, IngestionReport), IndexBuildError>
where
    E: Embedder + ?Sized,
{
    options.validate()?;

    let PreparedChunks { chunks, report } = prepare_chunks(folder, options)?;
    info!(
        folder = %folder.display(),
        files = report.files_loaded,
        documents = report.documents,
        chunk_count = chunks.len(),
        "embedding chunks"
    );

    let vectors = embed_chunks(embedder, &chunks, options.embed_batch_size).await?;
    let index = FlatIndex::build(embedder.model_info(), chunks, vectors)?;

    Ok((index, report))
}

/// Rebuilds the snapshot in `snapshot_dir` from `folder`.
///
/// The snapshot lock is held from the first file read to the final rename, so
/// two rebuilds cannot interleave and readers see the directory as busy.
pub async fn rebuild_snapshot<E>(
    folder: &Path,
    snapshot_dir: &Path,
    options: &IngestionOptions,
    embedder: &E,
) -> Result<(SnapshotManifest, IngestionReport), IndexBuildError>
where
    E: Embedder + ?Sized,
{
    let _lock = SnapshotLock::acquire(snapshot_dir)?;
    let (index, report) = build_index(folder, options, embedder).await?;
    let manifest = index.save_locked(snapshot_dir, options)?;
    Ok((manifest, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::IndexError;
    use crate::models::DocumentKind;
    use crate::traits::VectorIndex;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    #[test]
    fn discover_files_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("b.txt")).and_then(|mut file| file.write_all(b"b"))?;
        File::create(nested.join("a.CSV")).and_then(|mut file| file.write_all(b"x\n1"))?;
        File::create(base.join("image.png")).and_then(|mut file| file.write_all(b"png"))?;

        let files = discover_files(base)?;
        assert_eq!(files.supported, vec![base.join("b.txt"), nested.join("a.CSV")]);
        assert_eq!(files.unsupported, vec![base.join("image.png")]);
        Ok(())
    }

    #[test]
    fn missing_folder_is_an_error() {
        assert!(discover_files(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn ingestion_fails_without_supported_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("notes.md"), "# notes")?;

        let result = load_folder(dir.path());
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn best_effort_skips_unreadable_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("season.txt"), "The Lakers won.")?;
        fs::write(dir.path().join("logo.png"), b"png")?;

        let report = load_folder(dir.path())?;

        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        assert_eq!(report.unsupported_files.len(), 1);
        Ok(())
    }

    #[test]
    fn documents_are_normalized_before_chunking() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("season.txt"), "The   Lakers\n\nWON the title.  ")?;
        fs::write(dir.path().join("blank.txt"), "   \n\t ")?;

        let prepared = prepare_chunks(dir.path(), &IngestionOptions::default())?;

        assert_eq!(prepared.report.files_loaded, 2);
        assert_eq!(prepared.report.documents, 1);
        assert_eq!(prepared.chunks.len(), 1);
        let chunk = &prepared.chunks[0];
        assert_eq!(chunk.content, "the lakers won the title.");
        assert_eq!(chunk.metadata.source, "season.txt");
        assert_eq!(chunk.metadata.kind, DocumentKind::Text);
        Ok(())
    }

    #[test]
    fn strict_policy_drops_unexpected_characters() {
        let documents = vec![Document::new(
            "Score: 102–99 (OT)!",
            crate::models::DocumentMetadata::new("a.txt", DocumentKind::Text),
        )];

        let normalized = normalize_documents(documents, NormalizationPolicy::Strict);
        assert_eq!(normalized[0].content, "score: 10299 ot");
    }

    #[tokio::test]
    async fn build_index_embeds_in_batches() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let rows: String = (0..5).map(|row| format!("team{row},{row}\n")).collect();
        fs::write(dir.path().join("standings.csv"), format!("team,wins\n{rows}"))?;

        let embedder = CountingEmbedder {
            inner: CharacterNgramEmbedder::new(16),
            batches: AtomicUsize::new(0),
        };
        let options = IngestionOptions {
            embed_batch_size: 2,
            ..IngestionOptions::default()
        };

        let (index, report) = build_index(dir.path(), &options, &embedder).await?;

        assert_eq!(report.chunks, 5);
        assert_eq!(index.len(), 5);
        assert_eq!(index.model().dimensions, 16);
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn rebuild_refuses_to_run_concurrently() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        fs::create_dir(&data)?;
        fs::write(data.join("season.txt"), "The Lakers won.")?;
        let snapshot = dir.path().join("vector_index");
        let embedder = CharacterNgramEmbedder::default();

        let held = SnapshotLock::acquire(&snapshot)?;
        let result = rebuild_snapshot(&data, &snapshot, &IngestionOptions::default(), &embedder).await;
        assert!(matches!(
            result,
            Err(IndexBuildError::Index(IndexError::SnapshotBusy(_)))
        ));
        drop(held);

        let (manifest, report) =
            rebuild_snapshot(&data, &snapshot, &IngestionOptions::default(), &embedder).await?;
        assert_eq!(manifest.chunk_count, 1);
        assert_eq!(report.files_loaded, 1);
        assert_eq!(FlatIndex::load(&snapshot, &embedder.model_info())?.len(), 1);
        Ok(())
    }
}
