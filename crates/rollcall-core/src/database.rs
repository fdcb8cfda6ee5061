//! Enrolled embedding database and its on-disk snapshot.
//!
//! The snapshot is a single JSON document holding two index-aligned lists,
//! `embeddings` and `ids`. It is replaced wholesale on save and never
//! edited in place.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Snapshot format version written by [`save`].
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("embedding database not found: {0} (run enrollment first)")]
    NotFound(PathBuf),
    #[error("enrollment produced no usable face embeddings")]
    Empty,
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid database snapshot {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("database i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered (embedding, user id) pairs, one per usable enrollment photo.
///
/// The same id may appear several times. All embeddings share one dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingDatabase {
    embeddings: Vec<Embedding>,
    ids: Vec<String>,
}

impl EmbeddingDatabase {
    /// Build from pairs, rejecting embeddings whose dimension differs from
    /// the first one.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Embedding, String)>,
    ) -> Result<Self, DatabaseError> {
        let mut db = Self::default();
        for (embedding, id) in pairs {
            db.push(embedding, id)?;
        }
        Ok(db)
    }

    pub(crate) fn push(&mut self, embedding: Embedding, id: String) -> Result<(), DatabaseError> {
        if let Some(expected) = self.dimension() {
            if embedding.dimension() != expected {
                return Err(DatabaseError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                });
            }
        }
        self.embeddings.push(embedding);
        self.ids.push(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding dimension, or `None` for an empty database.
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Embedding::dimension)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Embedding, &str)> {
        self.embeddings
            .iter()
            .zip(self.ids.iter().map(String::as_str))
    }

    /// Number of distinct user ids.
    pub fn user_count(&self) -> usize {
        let mut ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    embeddings: Vec<Embedding>,
    ids: Vec<String>,
}

/// Write `db` to `path`, replacing any previous snapshot.
///
/// The document is written to a sibling temporary file and renamed over
/// the target, so readers never observe a partial snapshot.
pub fn save(path: &Path, db: &EmbeddingDatabase) -> Result<(), DatabaseError> {
    let io_err = |source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        dimension: db.dimension().unwrap_or(0),
        embeddings: db.embeddings.clone(),
        ids: db.ids.clone(),
    };
    let json = serde_json::to_vec(&snapshot).map_err(|e| DatabaseError::Format {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;

    tracing::info!(
        path = %path.display(),
        entries = db.len(),
        users = db.user_count(),
        "embedding database saved"
    );
    Ok(())
}

/// Load a snapshot written by [`save`].
///
/// A missing file is [`DatabaseError::NotFound`]; a snapshot with zero
/// entries loads as an empty database.
pub fn load(path: &Path) -> Result<EmbeddingDatabase, DatabaseError> {
    if !path.exists() {
        return Err(DatabaseError::NotFound(path.to_path_buf()));
    }

    let bytes = fs::read(path).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format_err = |reason: String| DatabaseError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let snapshot: Snapshot =
        serde_json::from_slice(&bytes).map_err(|e| format_err(e.to_string()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(format_err(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    if snapshot.embeddings.len() != snapshot.ids.len() {
        return Err(format_err(format!(
            "{} embeddings but {} ids",
            snapshot.embeddings.len(),
            snapshot.ids.len()
        )));
    }
    if let Some(bad) = snapshot
        .embeddings
        .iter()
        .find(|e| e.dimension() != snapshot.dimension)
    {
        return Err(DatabaseError::DimensionMismatch {
            expected: snapshot.dimension,
            actual: bad.dimension(),
        });
    }

    let db = EmbeddingDatabase {
        embeddings: snapshot.embeddings,
        ids: snapshot.ids,
    };
    tracing::info!(
        path = %path.display(),
        entries = db.len(),
        dimension = snapshot.dimension,
        "embedding database loaded"
    );
    Ok(db)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
