//! On-disk snapshot of a [`FlatIndex`].
//!
//! A snapshot directory holds `index.json` (chunks and vectors) and
//! `manifest.json` (format version, embedding model, ingestion options and a
//! SHA-256 of `index.json`). Rebuilds hold `<dir>.lock` for their whole
//! duration, write into `<dir>.staging` and swap it in by rename, so a reader
//! sees either the old snapshot, the new one, or a busy error. A lock whose
//! owning process has died is treated as stale.

use super::FlatIndex;
use crate::error::IndexError;
use crate::models::{EmbeddingModelInfo, IngestionOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub model: EmbeddingModelInfo,
    pub chunk_count: usize,
    pub ingestion: IngestionOptions,
    pub created_at: DateTime<Utc>,
    pub index_sha256: String,
}

/// Exclusive marker held while a snapshot is being rebuilt.
///
/// The lock file records the owning process id. A lock left behind by a
/// process that no longer runs is stale and gets reclaimed.
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
}

impl SnapshotLock {
    pub fn acquire(dir: &Path) -> Result<Self, IndexError> {
        let path = sibling(dir, "lock");
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match create_lock_file(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(&path) {
                    return Err(IndexError::SnapshotBusy(dir.to_path_buf()));
                }
                warn!(lock = %path.display(), "reclaiming stale snapshot lock");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(error) if error.kind() == ErrorKind::NotFound => {}
                    Err(error) => return Err(error.into()),
                }
                match create_lock_file(&path) {
                    Ok(()) => {}
                    Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                        return Err(IndexError::SnapshotBusy(dir.to_path_buf()));
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            Err(error) => return Err(error.into()),
        }

        debug!(lock = %path.display(), "snapshot lock acquired");
        Ok(Self { path })
    }
}

fn create_lock_file(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())
}

/// True when the lock file names a process that is no longer running.
fn is_stale(lock: &Path) -> bool {
    let holder = fs::read_to_string(lock)
        .ok()
        .and_then(|contents| contents.trim().parse::<u32>().ok());
    match holder {
        Some(pid) => !process_alive(pid),
        None => false,
    }
}

/// Whether a live rebuild currently holds the lock for `dir`.
fn rebuild_in_progress(dir: &Path) -> bool {
    let lock = sibling(dir, "lock");
    if !lock.exists() {
        return false;
    }
    if is_stale(&lock) {
        warn!(lock = %lock.display(), "ignoring stale snapshot lock");
        return false;
    }
    true
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks that the process exists and may be signalled.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %error, "failed to release snapshot lock");
        }
    }
}

impl FlatIndex {
    /// Writes the index to `dir`, replacing any previous snapshot there.
    pub fn save(&self, dir: &Path, options: &IngestionOptions) -> Result<SnapshotManifest, IndexError> {
        let _lock = SnapshotLock::acquire(dir)?;
        self.save_locked(dir, options)
    }

    /// Like [`FlatIndex::save`], for callers already holding the lock.
    pub fn save_locked(
        &self,
        dir: &Path,
        options: &IngestionOptions,
    ) -> Result<SnapshotManifest, IndexError> {
        let staging = sibling(dir, "staging");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let index_bytes = serde_json::to_vec(self)?;
        fs::write(staging.join(INDEX_FILE), &index_bytes)?;

        let manifest = SnapshotManifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            model: self.model_info().clone(),
            chunk_count: self.entries().len(),
            ingestion: options.clone(),
            created_at: Utc::now(),
            index_sha256: sha256_hex(&index_bytes),
        };
        fs::write(staging.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

        if dir.exists() {
            let previous = sibling(dir, "previous");
            if previous.exists() {
                fs::remove_dir_all(&previous)?;
            }
            fs::rename(dir, &previous)?;
            fs::rename(&staging, dir)?;
            fs::remove_dir_all(&previous)?;
        } else {
            fs::rename(&staging, dir)?;
        }

        info!(
            dir = %dir.display(),
            chunk_count = manifest.chunk_count,
            model = %manifest.model,
            "index snapshot saved"
        );
        Ok(manifest)
    }

    /// Loads the snapshot in `dir`, checking it matches the configured embedder.
    pub fn load(dir: &Path, expected: &EmbeddingModelInfo) -> Result<Self, IndexError> {
        let manifest = read_manifest(dir)?;
        if &manifest.model != expected {
            return Err(IndexError::ModelMismatch {
                built: manifest.model.to_string(),
                configured: expected.to_string(),
            });
        }

        let index_bytes = fs::read(dir.join(INDEX_FILE))?;
        let actual = sha256_hex(&index_bytes);
        if actual != manifest.index_sha256 {
            return Err(IndexError::ChecksumMismatch {
                expected: manifest.index_sha256,
                actual,
            });
        }

        let index: FlatIndex = serde_json::from_slice(&index_bytes)?;
        if index.model_info() != &manifest.model || index.entries().len() != manifest.chunk_count {
            return Err(IndexError::InvalidInput(format!(
                "index.json does not match manifest in {}",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), chunk_count = manifest.chunk_count, "index snapshot loaded");
        Ok(index)
    }
}

pub fn read_manifest(dir: &Path) -> Result<SnapshotManifest, IndexError> {
    if rebuild_in_progress(dir) {
        return Err(IndexError::SnapshotBusy(dir.to_path_buf()));
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&manifest_path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(IndexError::MissingSnapshot(dir.to_path_buf()));
        }
        Err(error) => return Err(error.into()),
    };

    let manifest: SnapshotManifest = serde_json::from_slice(&bytes)?;
    if manifest.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(IndexError::UnsupportedFormat(manifest.format_version));
    }
    Ok(manifest)
}

/// `<dir>.<suffix>` next to the snapshot directory.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let normalized: PathBuf = dir.components().collect();
    let mut name = normalized.into_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
