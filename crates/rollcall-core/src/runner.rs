//! The driving loop of an attendance session.
//!
//! Single-threaded and poll-driven: one frame is acquired, processed and
//! presented before the next is requested. A stop request is honoured at
//! the next iteration boundary. The frame source is owned by the loop and
//! released after the final flush, on every exit path.

use crate::capabilities::{CaptureError, FrameSource};
use crate::database::DatabaseError;
use crate::log_store::{AttendanceLogStore, LogError};
use crate::processor::{AnnotatedFrame, FrameProcessor};
use crate::session::Session;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("camera capture failed: {0}")]
    Capture(#[from] CaptureError),
    /// The loop ended but its records could not be written. They stay
    /// buffered in the session; `Session::stop` retries the flush.
    #[error("{pending} attendance records not written: {source}")]
    Flush {
        summary: SessionSummary,
        pending: usize,
        #[source]
        source: LogError,
    },
}

/// Why the loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    EndOfStream,
    FrameLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub frames: u64,
    pub faces: u64,
    pub frame_errors: u64,
    pub marked: usize,
    pub written: usize,
    pub stop_reason: StopReason,
}

/// Runs sessions against a fixed database path and log store.
pub struct SessionRunner {
    processor: FrameProcessor,
    store: Box<dyn AttendanceLogStore>,
    database_path: PathBuf,
    max_frames: Option<u64>,
}

impl SessionRunner {
    pub fn new(
        processor: FrameProcessor,
        store: Box<dyn AttendanceLogStore>,
        database_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            processor,
            store,
            database_path: database_path.into(),
            max_frames: None,
        }
    }

    /// Stop after `limit` frames.
    pub fn with_max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames = limit;
        self
    }

    pub fn store(&self) -> &dyn AttendanceLogStore {
        self.store.as_ref()
    }

    /// Start `session`, open the frame source and process frames until a
    /// stop request, end of stream, the frame limit, or a capture failure.
    ///
    /// The buffered attendance is flushed before the source is released.
    /// On capture failure the flush is still attempted and the capture
    /// error is returned. Records a failed flush leaves behind stay in
    /// `session` for the caller to retry with [`Session::stop`].
    pub fn run<S, O, P>(
        &mut self,
        session: &mut Session,
        open_source: O,
        stop: &AtomicBool,
        mut present: P,
    ) -> Result<SessionSummary, SessionError>
    where
        S: FrameSource,
        O: FnOnce() -> Result<S, CaptureError>,
        P: FnMut(&AnnotatedFrame),
    {
        session.start(&self.database_path)?;

        let mut source = match open_source() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(session = %session.id(), error = %e, "failed to open frame source");
                self.stop_best_effort(session);
                return Err(e.into());
            }
        };

        let mut summary = SessionSummary {
            session_id: session.id(),
            frames: 0,
            faces: 0,
            frame_errors: 0,
            marked: 0,
            written: 0,
            stop_reason: StopReason::Requested,
        };

        let outcome = loop {
            if stop.load(Ordering::SeqCst) {
                break Ok(StopReason::Requested);
            }
            if self.max_frames.is_some_and(|limit| summary.frames >= limit) {
                break Ok(StopReason::FrameLimit);
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(StopReason::EndOfStream),
                Err(e) => break Err(e),
            };
            summary.frames += 1;

            let (db, tracker, recorder) = session.parts_mut();
            match self.processor.process_frame(&frame, db, tracker, recorder) {
                Ok(annotated) => {
                    summary.faces += annotated.faces.len() as u64;
                    present(&annotated);
                }
                Err(e) => {
                    summary.frame_errors += 1;
                    tracing::warn!(frame = summary.frames, error = %e, "frame processing failed");
                    present(&AnnotatedFrame::bare(frame));
                }
            }
        };

        summary.marked = session.tracker().marked_count();

        match outcome {
            Ok(reason) => {
                tracing::info!(session = %summary.session_id, ?reason, frames = summary.frames, "session ending");
                let flushed = session.stop(self.store.as_ref());
                drop(source);
                summary.stop_reason = reason;
                match flushed {
                    Ok(written) => {
                        summary.written = written;
                        Ok(summary)
                    }
                    Err(source) => Err(SessionError::Flush {
                        pending: session.recorder().len(),
                        summary,
                        source,
                    }),
                }
            }
            Err(e) => {
                tracing::error!(session = %summary.session_id, error = %e, "capture failed; stopping session");
                self.stop_best_effort(session);
                drop(source);
                Err(e.into())
            }
        }
    }

    fn stop_best_effort(&self, session: &mut Session) {
        // Failures are already logged by `Session::stop`.
        let _ = session.stop(self.store.as_ref());
    }
}
