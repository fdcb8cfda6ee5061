use serde::{Deserialize, Serialize};

/// Label used for faces that did not match any enrolled user.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Integer pixel rectangle `(left, top, right, bottom)` clamped to a
    /// `width`×`height` frame. Returns `None` if nothing of the box is visible.
    pub fn clamped(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let left = self.x.round().clamp(0.0, max_x) as u32;
        let top = self.y.round().clamp(0.0, max_y) as u32;
        let right = (self.x + self.width).round().clamp(0.0, max_x) as u32;
        let bottom = (self.y + self.height).round().clamp(0.0, max_y) as u32;
        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, right, bottom))
    }
}

/// Face embedding vector produced by the external encoder.
///
/// Immutable once created; serialized as a bare array of floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Result of matching one probe embedding against the database.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Enrolled user id of the nearest entry, present only when matched.
    pub candidate_id: Option<String>,
    /// Distance to the nearest entry (`+inf` for an empty database).
    pub distance: f32,
    pub matched: bool,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            candidate_id: None,
            distance,
            matched: false,
        }
    }

    /// The candidate id, or `"unknown"`.
    pub fn label(&self) -> &str {
        self.candidate_id.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}
