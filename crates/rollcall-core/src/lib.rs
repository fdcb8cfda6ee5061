//! rollcall-core — Embedding matching and attendance sessions.
//!
//! Matches face embeddings against an enrolled database, records each
//! identified user at most once per session and flushes the records to a
//! date-partitioned log. Face encoding, frame capture and account lookup
//! are consumed through the traits in [`capabilities`].

pub mod accounts;
pub mod capabilities;
mod csv;
pub mod database;
pub mod enrollment;
pub mod log_store;
pub mod matcher;
pub mod processor;
pub mod record;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use capabilities::{AccountLookup, CaptureError, EncoderError, FaceEncoder, FrameSource};
pub use database::{DatabaseError, EmbeddingDatabase};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_TOLERANCE};
pub use processor::{AnnotatedFrame, FrameProcessor};
pub use record::AttendanceRecord;
pub use runner::{SessionError, SessionRunner, SessionSummary};
pub use session::{Session, SessionTracker};
pub use types::{BoundingBox, Embedding, MatchResult};
