//! Attendance session state: who has been marked, and what awaits a flush.
//!
//! A [`Session`] is an explicit value owned by the driving loop. It moves
//! between two states:
//!
//! ```text
//! Idle --start--> Active   (reload database, reset tracker and buffer)
//! Active --stop--> Idle    (flush buffer to the attendance log)
//! ```

use crate::database::{self, DatabaseError, EmbeddingDatabase};
use crate::log_store::{AttendanceLogStore, LogError};
use crate::recorder::AttendanceRecorder;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Per-session deduplication: each user is recorded at most once.
#[derive(Debug, Default)]
pub struct SessionTracker {
    marked_users: HashSet<String>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `candidate_id` has not been recorded in this session yet.
    pub fn should_mark(&self, candidate_id: &str) -> bool {
        !self.marked_users.contains(candidate_id)
    }

    /// Record `candidate_id` as marked. Returns `false` if it already was.
    pub fn mark_and_record(&mut self, candidate_id: &str) -> bool {
        self.marked_users.insert(candidate_id.to_string())
    }

    pub fn marked_count(&self) -> usize {
        self.marked_users.len()
    }

    pub fn reset(&mut self) {
        self.marked_users.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// An attendance session and everything it exclusively owns.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    database: EmbeddingDatabase,
    tracker: SessionTracker,
    recorder: AttendanceRecorder,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::nil(),
            state: SessionState::Idle,
            database: EmbeddingDatabase::default(),
            tracker: SessionTracker::new(),
            recorder: AttendanceRecorder::new(),
        }
    }

    /// Start (or restart) the session, reloading the database from `path`.
    ///
    /// If the database cannot be loaded the session stays in its previous
    /// state and the error is returned.
    pub fn start(&mut self, database_path: &Path) -> Result<(), DatabaseError> {
        let db = database::load(database_path)?;
        self.start_with(db);
        Ok(())
    }

    /// Start (or restart) the session against an already loaded database.
    pub fn start_with(&mut self, database: EmbeddingDatabase) {
        if !self.recorder.is_empty() {
            tracing::warn!(
                session = %self.id,
                dropped = self.recorder.len(),
                "discarding unflushed records from previous session"
            );
        }
        self.reset();
        self.database = database;
        self.id = Uuid::new_v4();
        self.state = SessionState::Active;
        tracing::info!(
            session = %self.id,
            entries = self.database.len(),
            users = self.database.user_count(),
            "session started"
        );
    }

    /// Stop the session, flushing buffered records to `store`.
    ///
    /// The session is Idle afterwards even if the flush fails. Unwritten
    /// records stay buffered, and calling `stop` again on the idle session
    /// retries the flush. The next start discards them.
    pub fn stop(&mut self, store: &dyn AttendanceLogStore) -> Result<usize, LogError> {
        if self.state == SessionState::Idle && self.recorder.is_empty() {
            return Ok(0);
        }
        self.state = SessionState::Idle;
        let result = self.recorder.flush(store);
        match &result {
            Ok(written) => tracing::info!(session = %self.id, written, "session stopped"),
            Err(e) => tracing::error!(
                session = %self.id,
                error = %e,
                pending = self.recorder.len(),
                "session stopped but attendance flush failed"
            ),
        }
        result
    }

    /// Clear marked users and the pending buffer.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.recorder.clear();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn database(&self) -> &EmbeddingDatabase {
        &self.database
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn recorder(&self) -> &AttendanceRecorder {
        &self.recorder
    }

    /// Split borrow for frame processing: the database read-only, the
    /// tracker and recorder mutable.
    pub fn parts_mut(
        &mut self,
    ) -> (&EmbeddingDatabase, &mut SessionTracker, &mut AttendanceRecorder) {
        (&self.database, &mut self.tracker, &mut self.recorder)
    }
}
