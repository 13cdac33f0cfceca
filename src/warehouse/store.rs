//! SQLite-backed warehouse store.
//!
//! Owns the single connection used by a run. The connection is closed when
//! the store is dropped.

use super::models::{Artist, RowCounts, Song, SongMatch, SongPlay, TimeRow, User};
use super::schema::{
    PlayKey, WarehouseSchema, DATABASE_INTEGRITY_CHECK, SONG_SELECT, TABLE_ROWCOUNT_CHECK,
};
use super::trait_def::WarehouseStore;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options applied when opening the warehouse.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub play_key: PlayKey,
    /// Drop every table before creating the schema.
    pub reset: bool,
    pub busy_timeout: Option<Duration>,
}

/// Insert statements rendered once from the schema.
struct UpsertStatements {
    song: String,
    artist: String,
    time: String,
    user: String,
    songplay: String,
}

impl UpsertStatements {
    fn render(schema: &WarehouseSchema) -> Result<Self> {
        let render = |table: &crate::sqlite_persistence::Table| {
            table
                .upsert_sql()
                .with_context(|| format!("Table {} has no upsert policy", table.name))
        };
        Ok(UpsertStatements {
            song: render(schema.songs)?,
            artist: render(schema.artists)?,
            time: render(schema.time)?,
            user: render(schema.users)?,
            songplay: render(schema.songplays)?,
        })
    }
}

pub struct SqliteWarehouseStore {
    conn: Connection,
    schema: WarehouseSchema,
    statements: UpsertStatements,
}

fn ensure_schema(conn: &Connection, schema: &WarehouseSchema, reset: bool) -> Result<()> {
    if reset {
        info!("Dropping all warehouse tables");
        for table in schema.tables() {
            table.drop(conn)?;
        }
    }

    for table in schema.tables() {
        if table.exists(conn)? {
            table
                .validate(conn)
                .with_context(|| format!("Existing table {} does not match", table.name))?;
        } else {
            info!("Creating table {}", table.name);
            table.create(conn)?;
        }
    }
    Ok(())
}

impl SqliteWarehouseStore {
    /// Opens (creating if needed) the warehouse database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, options: &StoreOptions) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open warehouse database {:?}", db_path))?;
        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        let store = Self::with_connection(conn, options)?;

        let counts = store.row_counts()?;
        info!(
            "Opened warehouse {:?}: {} songplays, {} users, {} songs, {} artists",
            db_path, counts.songplays, counts.users, counts.songs, counts.artists
        );
        Ok(store)
    }

    /// Opens a private in-memory warehouse.
    pub fn open_in_memory(options: &StoreOptions) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: &StoreOptions) -> Result<Self> {
        // Constraints stay off while loading, see apply_foreign_keys.
        conn.pragma_update(None, "foreign_keys", false)?;

        let schema = WarehouseSchema::new(options.play_key);
        ensure_schema(&conn, &schema, options.reset)?;
        let statements = UpsertStatements::render(&schema)?;

        Ok(SqliteWarehouseStore {
            conn,
            schema,
            statements,
        })
    }

    /// Raw access to the connection, for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn count_foreign_key_violations(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let violations = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for table in &violations {
            debug!("Foreign key violation in {}", table);
        }
        Ok(violations.len())
    }

    fn rebuild_constrained_tables(&self) -> Result<usize> {
        for table in self.schema.constrained_tables() {
            info!("Adding foreign keys to {}", table.name);
            table.rebuild_with_foreign_keys(&self.conn)?;
        }
        self.count_foreign_key_violations()
    }
}

impl WarehouseStore for SqliteWarehouseStore {
    fn insert_song(&self, song: &Song) -> Result<bool> {
        let changed = self.conn.prepare_cached(&self.statements.song)?.execute(params![
            song.song_id,
            song.title,
            song.artist_id,
            song.year,
            song.duration
        ])?;
        Ok(changed > 0)
    }

    fn insert_artist(&self, artist: &Artist) -> Result<bool> {
        let changed = self
            .conn
            .prepare_cached(&self.statements.artist)?
            .execute(params![
                artist.artist_id,
                artist.name,
                artist.location,
                artist.latitude,
                artist.longitude
            ])?;
        Ok(changed > 0)
    }

    fn insert_time(&self, time: &TimeRow) -> Result<bool> {
        let changed = self.conn.prepare_cached(&self.statements.time)?.execute(params![
            time.start_time,
            time.hour,
            time.day,
            time.week,
            time.month,
            time.year,
            time.weekday
        ])?;
        Ok(changed > 0)
    }

    fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn.prepare_cached(&self.statements.user)?.execute(params![
            user.user_id,
            user.first_name,
            user.last_name,
            user.gender,
            user.level
        ])?;
        Ok(())
    }

    fn insert_songplay(&self, play: &SongPlay) -> Result<bool> {
        let (song_id, artist_id) = match &play.song {
            Some(song) => (Some(song.song_id.as_str()), Some(song.artist_id.as_str())),
            None => (None, None),
        };
        let changed = self
            .conn
            .prepare_cached(&self.statements.songplay)?
            .execute(params![
                play.start_time,
                play.user_id,
                play.level,
                song_id,
                artist_id,
                play.session_id,
                play.location,
                play.user_agent
            ])?;
        Ok(changed > 0)
    }

    fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> Result<Option<SongMatch>> {
        match self.conn.prepare_cached(SONG_SELECT)?.query_row(
            params![title, artist_name, duration],
            |r| {
                Ok(SongMatch {
                    song_id: r.get(0)?,
                    artist_id: r.get(1)?,
                })
            },
        ) {
            Ok(found) => Ok(Some(found)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        // A failed statement may already have ended the transaction.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn row_counts(&self) -> Result<RowCounts> {
        let counts = self.conn.query_row(TABLE_ROWCOUNT_CHECK, [], |r| {
            Ok(RowCounts {
                songplays: r.get(0)?,
                time: r.get(1)?,
                users: r.get(2)?,
                songs: r.get(3)?,
                artists: r.get(4)?,
            })
        })?;
        Ok(counts)
    }

    fn count_integrity_matches(&self) -> Result<i64> {
        let matched = self
            .conn
            .query_row(DATABASE_INTEGRITY_CHECK, [], |r| r.get(0))?;
        Ok(matched)
    }

    fn foreign_keys_applied(&self) -> Result<bool> {
        for table in self.schema.constrained_tables() {
            if !table.foreign_keys_applied(&self.conn)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply_foreign_keys(&self) -> Result<usize> {
        self.conn.execute_batch("BEGIN")?;
        match self.rebuild_constrained_tables() {
            Ok(0) => {
                self.conn.execute_batch("COMMIT")?;
                self.conn.pragma_update(None, "foreign_keys", true)?;
                Ok(0)
            }
            Ok(violations) => {
                warn!(
                    "{} rows violate the foreign keys, leaving tables unconstrained",
                    violations
                );
                self.conn.execute_batch("ROLLBACK")?;
                Ok(violations)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteWarehouseStore {
        SqliteWarehouseStore::open_in_memory(&StoreOptions::default()).unwrap()
    }

    fn song() -> Song {
        Song {
            song_id: "S1".to_string(),
            title: "T".to_string(),
            artist_id: "AR1".to_string(),
            year: 2000,
            duration: 200.5,
        }
    }

    fn artist() -> Artist {
        Artist {
            artist_id: "AR1".to_string(),
            name: "A1".to_string(),
            location: "L1".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    fn user(level: &str) -> User {
        User {
            user_id: 8,
            first_name: "Kaylee".to_string(),
            last_name: "Summers".to_string(),
            gender: "F".to_string(),
            level: level.to_string(),
        }
    }

    fn play(start_time: &str, user_id: i64, song: Option<SongMatch>) -> SongPlay {
        SongPlay {
            start_time: start_time.to_string(),
            user_id,
            level: "free".to_string(),
            song,
            session_id: 139,
            location: "Phoenix-Mesa-Scottsdale, AZ".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }

    #[test]
    fn test_song_insert_first_write_wins() {
        let store = store();
        assert!(store.insert_song(&song()).unwrap());
        let mut renamed = song();
        renamed.title = "Other".to_string();
        assert!(!store.insert_song(&renamed).unwrap());

        let title: String = store
            .connection()
            .query_row("SELECT title FROM songs WHERE song_id = 'S1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "T");
    }

    #[test]
    fn test_user_upsert_overwrites_level_only() {
        let store = store();
        store.upsert_user(&user("free")).unwrap();
        let mut renamed = user("paid");
        renamed.first_name = "Someone".to_string();
        store.upsert_user(&renamed).unwrap();

        let (first_name, level): (String, String) = store
            .connection()
            .query_row(
                "SELECT first_name, level FROM users WHERE user_id = 8",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(first_name, "Kaylee");
        assert_eq!(level, "paid");
        assert_eq!(store.row_counts().unwrap().users, 1);
    }

    #[test]
    fn test_find_song_joins_artist_name() {
        let store = store();
        store.insert_song(&song()).unwrap();
        assert_eq!(store.find_song("T", "A1", 200.5).unwrap(), None);

        store.insert_artist(&artist()).unwrap();
        assert_eq!(
            store.find_song("T", "A1", 200.5).unwrap(),
            Some(SongMatch {
                song_id: "S1".to_string(),
                artist_id: "AR1".to_string()
            })
        );
    }

    #[test]
    fn test_songplay_duplicate_start_time_is_ignored() {
        let store = store();
        assert!(store
            .insert_songplay(&play("2018-11-01 21:01:46.796", 8, None))
            .unwrap());
        assert!(!store
            .insert_songplay(&play("2018-11-01 21:01:46.796", 9, None))
            .unwrap());
        assert_eq!(store.row_counts().unwrap().songplays, 1);
    }

    #[test]
    fn test_rollback_discards_uncommitted_rows() {
        let store = store();
        store.begin().unwrap();
        store.insert_artist(&artist()).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.row_counts().unwrap().artists, 0);
        // No open transaction left behind
        store.rollback().unwrap();
    }

    #[test]
    fn test_apply_foreign_keys_on_consistent_data() {
        let store = store();
        store.insert_artist(&artist()).unwrap();
        store.insert_song(&song()).unwrap();
        store.upsert_user(&user("free")).unwrap();
        store
            .insert_songplay(&play(
                "2018-11-01 21:01:46.796",
                8,
                Some(SongMatch {
                    song_id: "S1".to_string(),
                    artist_id: "AR1".to_string(),
                }),
            ))
            .unwrap();
        assert!(!store.foreign_keys_applied().unwrap());

        assert_eq!(store.apply_foreign_keys().unwrap(), 0);

        assert!(store.foreign_keys_applied().unwrap());
        assert_eq!(store.row_counts().unwrap().songplays, 1);
        let enforced: i64 = store
            .connection()
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(enforced, 1);
        // The rebuilt table still resolves conflicts on its key
        assert!(!store
            .insert_songplay(&play("2018-11-01 21:01:46.796", 8, None))
            .unwrap());
    }

    #[test]
    fn test_apply_foreign_keys_rejects_orphans() {
        let store = store();
        store
            .insert_songplay(&play("2018-11-01 21:01:46.796", 42, None))
            .unwrap();

        assert_eq!(store.apply_foreign_keys().unwrap(), 1);

        assert!(!store.foreign_keys_applied().unwrap());
        assert_eq!(store.row_counts().unwrap().songplays, 1);
        assert!(store.connection().is_autocommit());
    }

    #[test]
    fn test_reopen_validates_existing_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("warehouse.db");
        {
            let store = SqliteWarehouseStore::open(&db_path, &StoreOptions::default()).unwrap();
            store.insert_artist(&artist()).unwrap();
        }
        let store = SqliteWarehouseStore::open(&db_path, &StoreOptions::default()).unwrap();
        assert_eq!(store.row_counts().unwrap().artists, 1);

        let reset = StoreOptions {
            reset: true,
            ..Default::default()
        };
        drop(store);
        let store = SqliteWarehouseStore::open(&db_path, &reset).unwrap();
        assert_eq!(store.row_counts().unwrap(), RowCounts::default());
    }

    #[test]
    fn test_open_rejects_other_play_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("warehouse.db");
        drop(SqliteWarehouseStore::open(&db_path, &StoreOptions::default()).unwrap());

        let by_session = StoreOptions {
            play_key: PlayKey::StartTimeSession,
            ..Default::default()
        };
        let result = SqliteWarehouseStore::open(&db_path, &by_session);
        let message = format!("{:#}", result.err().unwrap());
        assert!(message.contains("songplays"));
        assert!(message.contains("unique constraints mismatch"));

        // Resetting rebuilds the table with the requested key
        let reset = StoreOptions {
            reset: true,
            ..by_session.clone()
        };
        drop(SqliteWarehouseStore::open(&db_path, &reset).unwrap());
        assert!(SqliteWarehouseStore::open(&db_path, &by_session).is_ok());
        assert!(SqliteWarehouseStore::open(&db_path, &StoreOptions::default()).is_err());
    }

    #[test]
    fn test_open_rejects_mismatched_table() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("warehouse.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE users (user_id INTEGER PRIMARY KEY)", [])
                .unwrap();
        }
        let result = SqliteWarehouseStore::open(&db_path, &StoreOptions::default());
        assert!(result.is_err());
        assert!(format!("{:#}", result.err().unwrap()).contains("users"));
    }
}
