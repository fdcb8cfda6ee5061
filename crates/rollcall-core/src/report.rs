use crate::record::AttendanceRecord;
use chrono::NaiveTime;
use std::collections::HashSet;

/// Overview of one day's attendance log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    pub total_records: usize,
    pub unique_users: usize,
    pub first_check_in: Option<NaiveTime>,
}

pub fn summarize(records: &[AttendanceRecord]) -> LogSummary {
    let unique: HashSet<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
    LogSummary {
        total_records: records.len(),
        unique_users: unique.len(),
        first_check_in: records.iter().map(|r| r.time).min(),
    }
}
