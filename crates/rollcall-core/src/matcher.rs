use crate::database::EmbeddingDatabase;
use crate::types::{Embedding, MatchResult};

/// Default Euclidean distance below which a probe is accepted as a match.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Strategy for comparing a probe embedding against the enrolled database.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, db: &EmbeddingDatabase, tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher with a single distance threshold.
///
/// Every entry is visited; the first entry at the minimum distance wins,
/// so ties resolve to the lowest index. A match requires
/// `distance < tolerance`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, db: &EmbeddingDatabase, tolerance: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, (embedding, _)) in db.iter().enumerate() {
            let dist = probe.euclidean_distance(embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < tolerance => MatchResult {
                candidate_id: Some(db.ids()[idx].clone()),
                distance: best_dist,
                matched: true,
            },
            _ => MatchResult::unknown(best_dist),
        }
    }
}
