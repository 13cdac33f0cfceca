//! Row types for the warehouse tables.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

/// Storage format of every timestamp, millisecond precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub location: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: String,
}

/// A row of the time dimension, derived from a play's start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub start_time: String,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Monday is 0.
    pub weekday: u32,
}

impl TimeRow {
    /// Builds the row for a UTC epoch-millisecond timestamp.
    ///
    /// Returns `None` when the timestamp is outside chrono's range.
    pub fn from_epoch_millis(ms: i64) -> Option<TimeRow> {
        let start_time = DateTime::from_timestamp_millis(ms)?.naive_utc();
        Some(TimeRow::from_start_time(&start_time))
    }

    pub fn from_start_time(start_time: &NaiveDateTime) -> TimeRow {
        TimeRow {
            start_time: start_time.format(TIMESTAMP_FORMAT).to_string(),
            hour: start_time.hour(),
            day: start_time.day(),
            week: start_time.iso_week().week(),
            month: start_time.month(),
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_monday(),
        }
    }
}

/// A fact row. `song_id` and `artist_id` are both set or both absent.
#[derive(Debug, Clone, PartialEq)]
pub struct SongPlay {
    pub start_time: String,
    pub user_id: i64,
    pub level: String,
    pub song: Option<SongMatch>,
    pub session_id: i64,
    pub location: String,
    pub user_agent: String,
}

/// Catalog identifiers resolved for a play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMatch {
    pub song_id: String,
    pub artist_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub songplays: i64,
    pub time: i64,
    pub users: i64,
    pub songs: i64,
    pub artists: i64,
}
