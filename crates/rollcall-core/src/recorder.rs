use crate::log_store::{AttendanceLogStore, LogError};
use crate::record::AttendanceRecord;
use chrono::NaiveDate;

/// In-memory buffer of attendance records awaiting a flush.
#[derive(Debug, Default)]
pub struct AttendanceRecorder {
    buffer: Vec<AttendanceRecord>,
}

impl AttendanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a record. No I/O.
    pub fn append(&mut self, record: AttendanceRecord) {
        self.buffer.push(record);
    }

    pub fn pending(&self) -> &[AttendanceRecord] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered records without persisting them.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Persist buffered records and empty the buffer.
    ///
    /// For each date present in the buffer, the existing log is read,
    /// the buffered records are appended in arrival order, and the result
    /// is written back. This read-modify-write is not isolated: two
    /// concurrent flushes for the same date can lose the earlier write.
    ///
    /// Returns the number of records written; an empty buffer is a no-op.
    /// On error, records for dates not yet written stay buffered.
    pub fn flush(&mut self, store: &dyn AttendanceLogStore) -> Result<usize, LogError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let mut dates: Vec<NaiveDate> = Vec::new();
        for record in &self.buffer {
            if !dates.contains(&record.date) {
                dates.push(record.date);
            }
        }

        let mut written = 0;
        for date in dates {
            let mut log = store.read(date)?;
            let before = log.len();
            log.extend(self.buffer.iter().filter(|r| r.date == date).cloned());
            store.write(date, &log)?;

            let count = log.len() - before;
            self.buffer.retain(|r| r.date != date);
            written += count;
            tracing::info!(%date, records = count, total = log.len(), "attendance flushed");
        }

        Ok(written)
    }
}
