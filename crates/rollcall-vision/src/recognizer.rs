//! Face embedding extractor via ONNX Runtime.
//!
//! Crops the detected face with a small margin, resizes it to the model's
//! square input and returns an L2-normalized embedding of the configured
//! dimension. Between unit embeddings, Euclidean distance `d` and cosine
//! similarity `c` satisfy `d² = 2 - 2c`, so the match tolerance has to be
//! chosen for the model rather than carried over from a cosine threshold.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::{BoundingBox, Embedding};
use std::path::Path;
use thiserror::Error;

const RECOGNIZER_MEAN: f32 = 127.5;
const RECOGNIZER_STD: f32 = 127.5;
/// Fraction of the box size added on every side before cropping.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizerConfig {
    /// Side of the square model input, in pixels.
    pub input_size: u32,
    /// Expected length of the model output.
    pub embedding_dim: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: 112,
            embedding_dim: 128,
        }
    }
}

pub struct FaceRecognizer {
    session: Session,
    config: RecognizerConfig,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path, config: RecognizerConfig) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            input_size = config.input_size,
            embedding_dim = config.embedding_dim,
            "loaded face recognizer"
        );

        Ok(Self { session, config })
    }

    pub fn config(&self) -> RecognizerConfig {
        self.config
    }

    /// Extract the embedding of one detected face.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Embedding, RecognizerError> {
        let crop = crop_face(image, face, self.config.input_size)?;
        let input = preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != self.config.embedding_dim {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                self.config.embedding_dim,
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// Square crop centred on the box, expanded by the margin and clamped to
/// the frame, resized to `size`×`size`.
fn crop_face(image: &RgbImage, face: &BoundingBox, size: u32) -> Result<RgbImage, RecognizerError> {
    let side = face.width.max(face.height) * (1.0 + 2.0 * CROP_MARGIN);
    let square = BoundingBox {
        x: face.x + face.width / 2.0 - side / 2.0,
        y: face.y + face.height / 2.0 - side / 2.0,
        width: side,
        height: side,
        confidence: face.confidence,
    };
    let (left, top, right, bottom) = square
        .clamped(image.width(), image.height())
        .ok_or(RecognizerError::EmptyCrop)?;

    let cropped = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    Ok(imageops::resize(&cropped, size, size, FilterType::Triangle))
}

fn preprocess(face: &RgbImage) -> Array4<f32> {
    let (w, h) = (face.width() as usize, face.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - RECOGNIZER_MEAN) / RECOGNIZER_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
