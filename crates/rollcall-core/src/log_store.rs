//! Date-partitioned attendance log: one CSV file per calendar date.
//!
//! Files are named `attendance_YYYY-MM-DD.csv` with the header
//! `User ID,Name,Date,Time,Status,Method`. The older two-column layout
//! (`User ID,Time`, where `Time` is a full `YYYY-MM-DD HH:MM:SS` stamp) is
//! still readable, as are files mixing both kinds of row under either
//! header order. It is never written.

use crate::csv;
use crate::record::{AttendanceRecord, STATUS_PRESENT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LOG_COLUMNS: [&str; 6] = ["User ID", "Name", "Date", "Time", "Status", "Method"];

const FILE_PREFIX: &str = "attendance_";
const FILE_SUFFIX: &str = ".csv";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("attendance log i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed attendance log {path}, line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Durable store of attendance records, partitioned by date.
pub trait AttendanceLogStore {
    /// All records logged for `date`, in file order. An absent log is empty.
    fn read(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LogError>;

    /// Replace the log for `date` with `records`.
    fn write(&self, date: NaiveDate, records: &[AttendanceRecord]) -> Result<(), LogError>;

    /// Dates that have a log, newest first.
    fn dates(&self) -> Result<Vec<NaiveDate>, LogError>;
}

/// CSV files under a single directory.
#[derive(Debug, Clone)]
pub struct CsvLogStore {
    dir: PathBuf,
}

impl CsvLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            date.format(DATE_FORMAT)
        ))
    }
}

impl AttendanceLogStore for CsvLogStore {
    fn read(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LogError> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;
        parse_log(&path, &text)
    }

    fn write(&self, date: NaiveDate, records: &[AttendanceRecord]) -> Result<(), LogError> {
        let path = self.path_for(date);
        let io_err = |source| LogError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let header = std::iter::once(LOG_COLUMNS.map(String::from));
        let rows = records.iter().map(|r| {
            [
                r.user_id.clone(),
                r.display_name.clone(),
                r.date.format(DATE_FORMAT).to_string(),
                r.time.format(TIME_FORMAT).to_string(),
                r.status.clone(),
                r.method.clone(),
            ]
        });
        let text = csv::write_rows(header.chain(rows));

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, text).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn dates(&self) -> Result<Vec<NaiveDate>, LogError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| LogError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut dates: Vec<NaiveDate> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
                NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
            })
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

/// Column positions resolved from a header row.
struct Columns {
    user_id: usize,
    name: Option<usize>,
    date: Option<usize>,
    time: usize,
    status: Option<usize>,
    method: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, String> {
        let find = |name: &str| header.iter().position(|h| h.trim() == name);
        Ok(Self {
            user_id: find("User ID").ok_or("missing `User ID` column")?,
            name: find("Name"),
            date: find("Date"),
            time: find("Time").ok_or("missing `Time` column")?,
            status: find("Status"),
            method: find("Method"),
        })
    }
}

fn parse_log(path: &Path, text: &str) -> Result<Vec<AttendanceRecord>, LogError> {
    let rows = csv::parse(text);
    let Some((header, body)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let malformed = |line: usize, reason: String| LogError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let columns = Columns::from_header(header).map_err(|r| malformed(1, r))?;

    body.iter()
        .enumerate()
        .map(|(i, row)| parse_row(&columns, row).map_err(|r| malformed(i + 2, r)))
        .collect()
}

fn parse_row(columns: &Columns, row: &[String]) -> Result<AttendanceRecord, String> {
    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(|s| s.trim());
    let user_id = cell(Some(columns.user_id))
        .filter(|s| !s.is_empty())
        .ok_or("empty user id")?;
    let raw_time = cell(Some(columns.time)).ok_or("missing time")?;

    // Legacy rows merged into a six-column file leave `Date` empty and carry
    // the full stamp in `Time`.
    let (date, time) = match cell(columns.date).filter(|s| !s.is_empty()) {
        Some(raw_date) => {
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
                .map_err(|e| format!("bad date {raw_date:?}: {e}"))?;
            let time = NaiveTime::parse_from_str(raw_time, TIME_FORMAT)
                .map_err(|e| format!("bad time {raw_time:?}: {e}"))?;
            (date, time)
        }
        None => {
            let stamp = NaiveDateTime::parse_from_str(raw_time, LEGACY_TIMESTAMP_FORMAT)
                .map_err(|e| format!("bad timestamp {raw_time:?}: {e}"))?;
            (stamp.date(), stamp.time())
        }
    };

    Ok(AttendanceRecord {
        user_id: user_id.to_string(),
        display_name: cell(columns.name).unwrap_or_default().to_string(),
        date,
        time,
        status: cell(columns.status)
            .filter(|s| !s.is_empty())
            .unwrap_or(STATUS_PRESENT)
            .to_string(),
        method: cell(columns.method).unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn record(user: &str, d: u32, h: u32) -> AttendanceRecord {
        AttendanceRecord::present(user, format!("{user} name"), date(d).and_hms_opt(h, 0, 0).unwrap())
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("logs"));
        let records = vec![record("alice", 14, 9), record("bob", 14, 10)];

        store.write(date(14), &records).unwrap();

        assert_eq!(store.read(date(14)).unwrap(), records);
        let text = fs::read_to_string(store.path_for(date(14))).unwrap();
        assert!(text.starts_with("User ID,Name,Date,Time,Status,Method\n"));
        assert!(text.contains("alice,alice name,2025-03-14,09:00:00,Present,Face Recognition\n"));
    }

    #[test]
    fn test_read_absent_and_empty_logs() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        assert!(store.read(date(1)).unwrap().is_empty());

        fs::write(store.path_for(date(2)), "").unwrap();
        assert!(store.read(date(2)).unwrap().is_empty());
    }

    #[test]
    fn test_read_legacy_two_column_log() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        fs::write(
            store.path_for(date(14)),
            "User ID,Time\nDEMO001,2025-03-14 07:15:00\nDEMO002,2025-03-14 09:30:12\n",
        )
        .unwrap();

        let records = store.read(date(14)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "DEMO001");
        assert_eq!(records[0].display_name, "");
        assert_eq!(records[0].date, date(14));
        assert_eq!(records[1].time, NaiveTime::from_hms_opt(9, 30, 12).unwrap());
        assert_eq!(records[1].status, "Present");
    }

    #[test]
    fn test_read_mixed_rows_six_column_header() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        fs::write(
            store.path_for(date(14)),
            "User ID,Name,Date,Time,Status,Method\n\
             alice,Alice,2025-03-14,09:00:00,Present,Face Recognition\n\
             DEMO001,,,2025-03-14 10:15:00,,\n",
        )
        .unwrap();

        let records = store.read(date(14)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_name, "Alice");
        assert_eq!(records[1].user_id, "DEMO001");
        assert_eq!(records[1].date, date(14));
        assert_eq!(records[1].time, NaiveTime::from_hms_opt(10, 15, 0).unwrap());
        assert_eq!(records[1].status, "Present");
    }

    #[test]
    fn test_read_mixed_rows_legacy_header_first() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        fs::write(
            store.path_for(date(14)),
            "User ID,Time,Name,Date,Status,Method\n\
             DEMO001,2025-03-14 07:15:00,,,,\n\
             alice,09:00:00,Alice,2025-03-14,Present,Face Recognition\n",
        )
        .unwrap();

        let records = store.read(date(14)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, NaiveTime::from_hms_opt(7, 15, 0).unwrap());
        assert_eq!(records[1].user_id, "alice");
        assert_eq!(records[1].method, "Face Recognition");
        assert_eq!(records[1].time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn test_read_malformed_row_reports_line() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        fs::write(
            store.path_for(date(14)),
            "User ID,Name,Date,Time,Status,Method\nalice,A,2025-03-14,09:00:00,Present,x\nbob,B,yesterday,10:00:00,Present,x\n",
        )
        .unwrap();

        match store.read(date(14)) {
            Err(LogError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn test_dates_newest_first_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path());
        store.write(date(3), &[record("a", 3, 8)]).unwrap();
        store.write(date(12), &[record("a", 12, 8)]).unwrap();
        fs::write(dir.path().join("notes.csv"), "x").unwrap();
        fs::write(dir.path().join("attendance_garbage.csv"), "x").unwrap();

        assert_eq!(store.dates().unwrap(), vec![date(12), date(3)]);
    }

    #[test]
    fn test_dates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = CsvLogStore::new(dir.path().join("nope"));
        assert!(store.dates().unwrap().is_empty());
    }
}
