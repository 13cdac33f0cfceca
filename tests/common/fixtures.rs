//! Data lake fixtures written into temporary directories.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary data lake with `song_data` and `log_data`, plus a directory for
/// the warehouse database.
pub struct DataLake {
    pub dir: TempDir,
}

impl DataLake {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("data/song_data")).unwrap();
        fs::create_dir_all(dir.path().join("data/log_data")).unwrap();
        fs::create_dir_all(dir.path().join("db")).unwrap();
        DataLake { dir }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn song_dir(&self) -> PathBuf {
        self.data_dir().join("song_data")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("log_data")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.dir.path().join("db")
    }

    /// Writes a catalog file at `song_data/<relative>`.
    pub fn add_song_file(&self, relative: &str, record: &Value) -> PathBuf {
        write_file(&self.song_dir(), relative, &record.to_string())
    }

    /// Writes an activity log at `log_data/<relative>`, one record per line.
    pub fn add_log_file(&self, relative: &str, records: &[Value]) -> PathBuf {
        let lines: Vec<String> = records.iter().map(Value::to_string).collect();
        write_file(&self.log_dir(), relative, &lines.join("\n"))
    }

    pub fn add_raw_log_file(&self, relative: &str, content: &str) -> PathBuf {
        write_file(&self.log_dir(), relative, content)
    }
}

fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn song_record(
    song_id: &str,
    title: &str,
    artist_id: &str,
    artist_name: &str,
    duration: f64,
) -> Value {
    json!({
        "num_songs": 1,
        "song_id": song_id,
        "title": title,
        "artist_id": artist_id,
        "year": 2000,
        "duration": duration,
        "artist_name": artist_name,
        "artist_location": "L1",
        "artist_latitude": null,
        "artist_longitude": null,
    })
}

/// A completed play. `song` is (title, artist name, length).
pub fn next_song(ts: i64, user_id: i64, level: &str, song: Option<(&str, &str, f64)>) -> Value {
    let (title, artist, length) = match song {
        Some((title, artist, length)) => (json!(title), json!(artist), json!(length)),
        None => (Value::Null, Value::Null, Value::Null),
    };
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": format!("First{}", user_id),
        "gender": "F",
        "itemInSession": 0,
        "lastName": format!("Last{}", user_id),
        "length": length,
        "level": level,
        "location": "Atlanta-Sandy Springs-Roswell, GA",
        "method": "PUT",
        "page": "NextSong",
        "registration": 1540940782796.0,
        "sessionId": 7,
        "song": title,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (Windows NT 6.1; WOW64)",
        "userId": user_id.to_string(),
    })
}

/// A navigation event that is not a completed play.
pub fn page_view(ts: i64, page: &str) -> Value {
    json!({
        "artist": null,
        "auth": "Logged In",
        "firstName": "Walter",
        "gender": "M",
        "itemInSession": 1,
        "lastName": "Frye",
        "length": null,
        "level": "free",
        "location": "San Francisco-Oakland-Hayward, CA",
        "method": "GET",
        "page": page,
        "registration": 1540919166796.0,
        "sessionId": 38,
        "song": null,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (Macintosh)",
        "userId": "39",
    })
}
