use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const STATUS_PRESENT: &str = "Present";
pub const METHOD_FACE_RECOGNITION: &str = "Face Recognition";

/// One attendance event, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub user_id: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
    pub method: String,
}

impl AttendanceRecord {
    /// A "present" record captured by face recognition at `at`.
    ///
    /// Sub-second precision is dropped to match the log's `HH:MM:SS` column.
    pub fn present(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        at: NaiveDateTime,
    ) -> Self {
        let time = at.time();
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            date: at.date(),
            time: time.with_nanosecond(0).unwrap_or(time),
            status: STATUS_PRESENT.to_string(),
            method: METHOD_FACE_RECOGNITION.to_string(),
        }
    }
}
