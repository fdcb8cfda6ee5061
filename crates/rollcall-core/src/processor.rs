//! Per-frame orchestration: detect, match, deduplicate, record, annotate.

use crate::capabilities::{AccountLookup, EncoderError, FaceEncoder};
use crate::database::EmbeddingDatabase;
use crate::matcher::Matcher;
use crate::record::AttendanceRecord;
use crate::recorder::AttendanceRecorder;
use crate::session::SessionTracker;
use crate::types::{BoundingBox, MatchResult, UNKNOWN_LABEL};
use chrono::NaiveDateTime;
use image::{Rgb, RgbImage};

const MATCHED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_BAR_HEIGHT: u32 = 12;

/// One detected face as drawn on the annotated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    /// `"<id> (<distance>)"` for matches, `"unknown"` otherwise.
    pub label: String,
    pub distance: f32,
    pub matched: bool,
}

/// A frame with every detected face boxed and labeled.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub faces: Vec<FaceAnnotation>,
    /// Users recorded for the first time in this session by this frame.
    pub newly_marked: Vec<String>,
}

impl AnnotatedFrame {
    /// The frame unchanged, with no faces.
    pub fn bare(image: RgbImage) -> Self {
        Self {
            image,
            faces: Vec::new(),
            newly_marked: Vec::new(),
        }
    }
}

/// Ties the external encoder and account lookup to matching and session
/// bookkeeping. Holds no session state of its own.
pub struct FrameProcessor {
    encoder: Box<dyn FaceEncoder>,
    matcher: Box<dyn Matcher>,
    accounts: Box<dyn AccountLookup>,
    tolerance: f32,
    clock: fn() -> NaiveDateTime,
}

impl FrameProcessor {
    pub fn new(
        encoder: Box<dyn FaceEncoder>,
        matcher: Box<dyn Matcher>,
        accounts: Box<dyn AccountLookup>,
        tolerance: f32,
    ) -> Self {
        Self {
            encoder,
            matcher,
            accounts,
            tolerance,
            clock: local_now,
        }
    }

    /// Replace the timestamp source used for new records.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Run one detection and match cycle over `frame`.
    ///
    /// Every matched face whose user is not yet marked in this session is
    /// recorded once in `recorder`. Every detected face is annotated,
    /// matched or not. `db` is only read.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        db: &EmbeddingDatabase,
        tracker: &mut SessionTracker,
        recorder: &mut AttendanceRecorder,
    ) -> Result<AnnotatedFrame, EncoderError> {
        let boxes = self.encoder.detect_faces(frame)?;
        if boxes.is_empty() {
            return Ok(AnnotatedFrame::bare(frame.clone()));
        }

        let embeddings = self.encoder.encode(frame, &boxes)?;
        if embeddings.len() != boxes.len() {
            tracing::warn!(
                faces = boxes.len(),
                embeddings = embeddings.len(),
                "encoder returned a mismatched number of embeddings"
            );
        }

        let mut faces = Vec::with_capacity(boxes.len());
        let mut newly_marked = Vec::new();

        for (i, bbox) in boxes.iter().enumerate() {
            let result = match embeddings.get(i) {
                Some(embedding) => self.matcher.compare(embedding, db, self.tolerance),
                None => MatchResult::unknown(f32::INFINITY),
            };

            if let Some(user_id) = result.candidate_id.as_deref().filter(|_| result.matched) {
                if tracker.should_mark(user_id) {
                    let name = self.display_name(user_id);
                    let record = AttendanceRecord::present(user_id, name, (self.clock)());
                    tracing::info!(
                        user_id,
                        name = %record.display_name,
                        distance = result.distance,
                        "attendance marked"
                    );
                    tracker.mark_and_record(user_id);
                    recorder.append(record);
                    newly_marked.push(user_id.to_string());
                }
            }

            tracing::debug!(label = result.label(), distance = result.distance, "face matched");
            faces.push(FaceAnnotation {
                bbox: *bbox,
                label: label_for(&result),
                distance: result.distance,
                matched: result.matched,
            });
        }

        let mut image = frame.clone();
        for face in &faces {
            draw_annotation(&mut image, face);
        }

        Ok(AnnotatedFrame {
            image,
            faces,
            newly_marked,
        })
    }

    /// Display name from the account store, falling back to the raw id.
    fn display_name(&self, user_id: &str) -> String {
        match self.accounts.get_user_by_id(user_id) {
            Ok(Some(account)) if !account.display_name.is_empty() => account.display_name,
            Ok(_) => {
                tracing::debug!(user_id, "no account name; using id");
                user_id.to_string()
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "account lookup failed; using id");
                user_id.to_string()
            }
        }
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn label_for(result: &MatchResult) -> String {
    match result.candidate_id.as_deref() {
        Some(id) if result.matched => format!("{id} ({:.2})", result.distance),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

/// Draw the face rectangle and a filled label bar above it.
fn draw_annotation(image: &mut RgbImage, face: &FaceAnnotation) {
    let Some((left, top, right, bottom)) = face.bbox.clamped(image.width(), image.height())
    else {
        return;
    };
    let color = if face.matched {
        MATCHED_COLOR
    } else {
        UNKNOWN_COLOR
    };

    for t in 0..BOX_THICKNESS {
        let (l, tp) = (left + t, top + t);
        let (r, b) = (right.saturating_sub(t), bottom.saturating_sub(t));
        if l > r || tp > b {
            break;
        }
        for x in l..=r {
            image.put_pixel(x, tp, color);
            image.put_pixel(x, b, color);
        }
        for y in tp..=b {
            image.put_pixel(l, y, color);
            image.put_pixel(r, y, color);
        }
    }

    // Label bar sits above the box, or inside its top edge near the frame border.
    let bar_top = top.saturating_sub(LABEL_BAR_HEIGHT);
    let bar_bottom = if bar_top == top {
        (top + LABEL_BAR_HEIGHT).min(bottom)
    } else {
        top
    };
    for y in bar_top..bar_bottom {
        for x in left..=right {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::EuclideanMatcher;
    use crate::testing::{face, fixed_clock, MapAccounts, ScriptedEncoder};
    use crate::types::Embedding;

    fn db() -> EmbeddingDatabase {
        EmbeddingDatabase::from_pairs(vec![
            (Embedding::new(vec![0.0, 0.0]), "alice".to_string()),
            (Embedding::new(vec![5.0, 5.0]), "bob".to_string()),
        ])
        .unwrap()
    }

    fn processor(encoder: ScriptedEncoder, accounts: MapAccounts) -> FrameProcessor {
        FrameProcessor::new(
            Box::new(encoder),
            Box::new(EuclideanMatcher),
            Box::new(accounts),
            0.5,
        )
        .with_clock(fixed_clock)
    }

    fn blank() -> RgbImage {
        RgbImage::new(64, 64)
    }

    #[test]
    fn test_matched_face_is_recorded_once_across_frames() {
        let encoder = ScriptedEncoder::new(vec![
            vec![face(10.0, vec![0.1, 0.0])],
            vec![face(12.0, vec![0.0, 0.2])],
        ]);
        let mut p = processor(encoder, MapAccounts::with(&[("alice", "Alice Liddell")]));
        let db = db();
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let first = p.process_frame(&blank(), &db, &mut tracker, &mut recorder).unwrap();
        let second = p.process_frame(&blank(), &db, &mut tracker, &mut recorder).unwrap();

        assert_eq!(first.newly_marked, vec!["alice".to_string()]);
        assert!(second.newly_marked.is_empty());
        assert_eq!(recorder.len(), 1);
        let record = &recorder.pending()[0];
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.display_name, "Alice Liddell");
        assert_eq!(record.date, fixed_clock().date());

        // Both frames are still annotated as matches.
        assert!(first.faces[0].matched && second.faces[0].matched);
        assert_eq!(second.faces[0].label, "alice (0.20)");
    }

    #[test]
    fn test_unknown_face_is_annotated_not_recorded() {
        let encoder = ScriptedEncoder::new(vec![vec![face(10.0, vec![2.5, 2.5])]]);
        let mut p = processor(encoder, MapAccounts::default());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let out = p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        assert_eq!(out.faces.len(), 1);
        assert_eq!(out.faces[0].label, "unknown");
        assert!(!out.faces[0].matched);
        assert!(recorder.is_empty());
        assert_eq!(tracker.marked_count(), 0);
    }

    #[test]
    fn test_multiple_faces_in_one_frame() {
        let encoder = ScriptedEncoder::new(vec![vec![
            face(2.0, vec![5.0, 5.1]),
            face(20.0, vec![9.0, 9.0]),
            face(40.0, vec![0.0, 0.1]),
        ]]);
        let mut p = processor(encoder, MapAccounts::default());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let out = p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        let labels: Vec<&str> = out.faces.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["bob (0.10)", "unknown", "alice (0.10)"]);
        assert_eq!(out.newly_marked, vec!["bob".to_string(), "alice".to_string()]);
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_lookup_failure_falls_back_to_id() {
        let encoder = ScriptedEncoder::new(vec![vec![face(10.0, vec![0.0, 0.0])]]);
        let mut p = processor(encoder, MapAccounts::failing());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        assert_eq!(recorder.pending()[0].display_name, "alice");
    }

    #[test]
    fn test_unknown_account_falls_back_to_id() {
        let encoder = ScriptedEncoder::new(vec![vec![face(10.0, vec![5.0, 5.0])]]);
        let mut p = processor(encoder, MapAccounts::with(&[("alice", "Alice")]));
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        assert_eq!(recorder.pending()[0].display_name, "bob");
    }

    #[test]
    fn test_no_faces_returns_frame_untouched() {
        let encoder = ScriptedEncoder::new(vec![vec![]]);
        let mut p = processor(encoder, MapAccounts::default());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let out = p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        assert!(out.faces.is_empty());
        assert_eq!(out.image, blank());
    }

    #[test]
    fn test_missing_embedding_is_annotated_unknown() {
        let mut encoder = ScriptedEncoder::new(vec![vec![face(10.0, vec![0.0, 0.0])]]);
        encoder.drop_embeddings = true;
        let mut p = processor(encoder, MapAccounts::default());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let out = p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        assert_eq!(out.faces.len(), 1);
        assert!(!out.faces[0].matched);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_annotation_draws_box_colors() {
        let encoder = ScriptedEncoder::new(vec![vec![
            face(20.0, vec![0.0, 0.0]),
            face(40.0, vec![9.0, 9.0]),
        ]]);
        let mut p = processor(encoder, MapAccounts::default());
        let mut tracker = SessionTracker::new();
        let mut recorder = AttendanceRecorder::new();

        let out = p.process_frame(&blank(), &db(), &mut tracker, &mut recorder).unwrap();

        // face(x) spans x..x+10 horizontally and 20..30 vertically.
        assert_eq!(*out.image.get_pixel(20, 25), MATCHED_COLOR);
        assert_eq!(*out.image.get_pixel(40, 25), UNKNOWN_COLOR);
        // Label bar above the box.
        assert_eq!(*out.image.get_pixel(25, 15), MATCHED_COLOR);
        // Box interior untouched.
        assert_eq!(*out.image.get_pixel(25, 25), Rgb([0, 0, 0]));
    }
}
