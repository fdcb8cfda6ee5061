//! rollcall-vision — ONNX face detection and embedding extraction.
//!
//! [`OnnxFaceEncoder`] pairs an SCRFD detector with an embedding model and
//! plugs into the session engine as a [`FaceEncoder`].

pub mod detector;
pub mod recognizer;

pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerConfig, RecognizerError};

use image::RgbImage;
use rollcall_core::{BoundingBox, Embedding, EncoderError, FaceEncoder};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    pub fn load(
        detector_path: &Path,
        recognizer_path: &Path,
        detector_confidence: f32,
        recognizer: RecognizerConfig,
    ) -> Result<Self, VisionError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path, detector_confidence)?,
            recognizer: FaceRecognizer::load(recognizer_path, recognizer)?,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.recognizer.config().embedding_dim
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        self.detector
            .detect(image)
            .map_err(|e| EncoderError(e.to_string()))
    }

    fn encode(
        &mut self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError> {
        boxes
            .iter()
            .map(|face| {
                self.recognizer
                    .extract(image, face)
                    .map_err(|e| EncoderError(e.to_string()))
            })
            .collect()
    }
}
