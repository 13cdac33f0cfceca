use super::RecordError;
use crate::warehouse::{TimeRow, User};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Page value of a completed song play. Every other record is ignored.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// A completed song play from an activity log.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayRecord {
    /// Epoch milliseconds.
    pub ts: i64,
    #[serde(deserialize_with = "user_id_from_json")]
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: String,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub session_id: i64,
    pub location: String,
    pub user_agent: String,
}

/// Log exports write user ids either as numbers or as numeric strings.
fn user_id_from_json<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUserId {
        Number(i64),
        Text(String),
    }

    match RawUserId::deserialize(deserializer)? {
        RawUserId::Number(id) => Ok(id),
        RawUserId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid userId {:?}", text))),
    }
}

impl PlayRecord {
    pub fn time_row(&self) -> Result<TimeRow, RecordError> {
        TimeRow::from_epoch_millis(self.ts).ok_or(RecordError::TimestampOutOfRange(self.ts))
    }

    pub fn user(&self) -> User {
        User {
            user_id: self.user_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            gender: self.gender.clone(),
            level: self.level.clone(),
        }
    }
}

/// A newline-delimited JSON activity log.
///
/// The file is not held open: every call to [`ActivityLog::plays`] starts a
/// fresh pass from the first line.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily yields the completed song plays of the file, in file order.
    pub fn plays(&self) -> Result<Plays, RecordError> {
        let file = File::open(&self.path).map_err(|source| RecordError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Plays {
            path: self.path.clone(),
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

pub struct Plays {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl Plays {
    fn json_error(&self, source: serde_json::Error) -> RecordError {
        RecordError::Json {
            path: self.path.clone(),
            line: self.line_number,
            source,
        }
    }
}

impl Iterator for Plays {
    type Item = Result<PlayRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(RecordError::Io {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(e) => return Some(Err(self.json_error(e))),
            };
            if value.get("page").and_then(Value::as_str) != Some(NEXT_SONG_PAGE) {
                continue;
            }
            return Some(serde_json::from_value(value).map_err(|e| self.json_error(e)));
        }
    }
}
