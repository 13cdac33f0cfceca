use super::RecordError;
use crate::warehouse::{Artist, Song};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// One song catalog file: a song and the artist performing it.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<Value>,
    pub artist_longitude: Option<Value>,
}

/// Coordinates are kept as text, in the form they had in the source file.
fn coordinate_text(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

impl SongRecord {
    /// Reads the first record of a catalog file.
    pub fn read(path: &Path) -> Result<SongRecord, RecordError> {
        let text = std::fs::read_to_string(path).map_err(|source| RecordError::Io {
            path: path.to_owned(),
            source,
        })?;
        match serde_json::Deserializer::from_str(&text)
            .into_iter::<SongRecord>()
            .next()
        {
            Some(Ok(record)) => Ok(record),
            Some(Err(source)) => Err(RecordError::Json {
                path: path.to_owned(),
                line: source.line(),
                source,
            }),
            None => Err(RecordError::EmptyFile(path.to_owned())),
        }
    }

    pub fn song(&self) -> Song {
        Song {
            song_id: self.song_id.clone(),
            title: self.title.clone(),
            artist_id: self.artist_id.clone(),
            year: self.year,
            duration: self.duration,
        }
    }

    pub fn artist(&self) -> Artist {
        Artist {
            artist_id: self.artist_id.clone(),
            name: self.artist_name.clone(),
            location: self.artist_location.clone().unwrap_or_default(),
            latitude: coordinate_text(&self.artist_latitude),
            longitude: coordinate_text(&self.artist_longitude),
        }
    }
}
