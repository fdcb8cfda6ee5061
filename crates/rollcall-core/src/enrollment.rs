//! Offline enrollment: build the embedding database from labeled photos.
//!
//! Layout: `<root>/<user_id>/<photo>.{jpg,jpeg,png}`. Each photo
//! contributes the embedding of its first detected face.

use crate::capabilities::FaceEncoder;
use crate::database::{DatabaseError, EmbeddingDatabase};
use crate::types::Embedding;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("enrollment directory not found: {0}")]
    RootNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Why a single enrollment photo contributed nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhotoError {
    #[error("no face detected")]
    NoFace,
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot encode face: {0}")]
    Encode(String),
}

#[derive(Debug, Clone)]
pub struct SkippedPhoto {
    pub user_id: String,
    pub path: PathBuf,
    pub reason: PhotoError,
}

/// Outcome of a successful build.
#[derive(Debug)]
pub struct BuildReport {
    pub database: EmbeddingDatabase,
    pub skipped: Vec<SkippedPhoto>,
    pub elapsed: Duration,
}

impl EmbeddingDatabase {
    /// Build a database from an enrollment tree.
    ///
    /// Unusable photos are logged and skipped. Fails with
    /// [`DatabaseError::Empty`] when no photo yields an embedding. Nothing is
    /// written to disk; persist the result with [`crate::database::save`].
    pub fn build(
        root: &Path,
        encoder: &mut dyn FaceEncoder,
    ) -> Result<BuildReport, EnrollmentError> {
        let start = Instant::now();
        if !root.is_dir() {
            return Err(EnrollmentError::RootNotFound(root.to_path_buf()));
        }

        let mut database = EmbeddingDatabase::default();
        let mut skipped = Vec::new();

        for user_dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
            let Some(user_id) = user_dir.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %user_dir.display(), "skipping non UTF-8 user directory");
                continue;
            };

            let photos: Vec<PathBuf> = sorted_entries(&user_dir)?
                .into_iter()
                .filter(|p| p.is_file() && is_photo(p))
                .collect();
            tracing::debug!(user_id, photos = photos.len(), "enrolling user");

            for photo in photos {
                let outcome = encode_photo(encoder, &photo).and_then(|embedding| {
                    database
                        .push(embedding, user_id.to_string())
                        .map_err(|e| PhotoError::Encode(e.to_string()))
                });
                if let Err(reason) = outcome {
                    tracing::warn!(user_id, path = %photo.display(), %reason, "skipping photo");
                    skipped.push(SkippedPhoto {
                        user_id: user_id.to_string(),
                        path: photo,
                        reason,
                    });
                }
            }
        }

        if database.is_empty() {
            tracing::error!(root = %root.display(), skipped = skipped.len(), "no valid face embeddings found");
            return Err(DatabaseError::Empty.into());
        }

        let elapsed = start.elapsed();
        tracing::info!(
            entries = database.len(),
            users = database.user_count(),
            skipped = skipped.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "enrollment complete"
        );

        Ok(BuildReport {
            database,
            skipped,
            elapsed,
        })
    }
}

fn encode_photo(encoder: &mut dyn FaceEncoder, path: &Path) -> Result<Embedding, PhotoError> {
    let image = image::open(path)
        .map_err(|e| PhotoError::Decode(e.to_string()))?
        .to_rgb8();

    let faces = encoder
        .detect_faces(&image)
        .map_err(|e| PhotoError::Encode(e.to_string()))?;
    // Enrollment photos are single-subject: only the first face counts.
    let first = faces.first().ok_or(PhotoError::NoFace)?;

    encoder
        .encode(&image, std::slice::from_ref(first))
        .map_err(|e| PhotoError::Encode(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| PhotoError::Encode("encoder returned no embedding".into()))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EnrollmentError> {
    let io_err = |source| EnrollmentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PHOTO_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}
