//! Collaborators the core consumes but does not implement: face encoding,
//! frame capture and account lookup.

use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("face encoder failed: {0}")]
pub struct EncoderError(pub String);

/// Face detection and embedding extraction.
///
/// Finding no face is not an error: both operations return an empty
/// sequence. Errors are reserved for malformed input or inference failure.
pub trait FaceEncoder {
    /// Detect faces, ordered as the detector ranks them (best first).
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError>;

    /// Compute one embedding per box, index-aligned with `boxes`.
    fn encode(
        &mut self,
        image: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, EncoderError>;
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

/// A sequence of image frames.
///
/// Dropping the source releases the underlying device.
pub trait FrameSource {
    /// Next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// An enrolled person as known to the account store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Error, Debug)]
#[error("account lookup failed: {0}")]
pub struct LookupError(pub String);

/// Account store lookup by user id.
pub trait AccountLookup {
    fn get_user_by_id(&self, user_id: &str) -> Result<Option<Account>, LookupError>;
}
