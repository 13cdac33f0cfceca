//! Star schema for the play analytics database.
//!
//! One fact table (`songplays`) and four dimensions (`users`, `songs`,
//! `artists`, `time`). Foreign keys are declared here but only applied once
//! the integrity check passes, see [`crate::etl::integrity`].

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ConflictAction, ForeignKey, ForeignKeyOnChange, SqlType, Table, Upsert,
};
use serde::Deserialize;

const ARTISTS_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const USERS_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "user_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SONGS_FK: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "song_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SONGPLAY_COLUMNS: &[Column<'static, &'static str>] = &[
    sqlite_column!("songplay_id", &SqlType::Integer, is_primary_key = true),
    sqlite_column!("start_time", &SqlType::Text, non_null = true),
    sqlite_column!(
        "user_id",
        &SqlType::Integer,
        non_null = true,
        foreign_key = Some(&USERS_FK)
    ),
    sqlite_column!("level", &SqlType::Text, non_null = true),
    sqlite_column!("song_id", &SqlType::Text, foreign_key = Some(&SONGS_FK)),
    sqlite_column!("artist_id", &SqlType::Text, foreign_key = Some(&ARTISTS_FK)),
    sqlite_column!("session_id", &SqlType::Integer, non_null = true),
    sqlite_column!("location", &SqlType::Text, non_null = true),
    sqlite_column!("user_agent", &SqlType::Text, non_null = true),
];

const SONGPLAY_INSERT_COLUMNS: &[&str] = &[
    "start_time",
    "user_id",
    "level",
    "song_id",
    "artist_id",
    "session_id",
    "location",
    "user_agent",
];

/// Fact table keyed on the millisecond start time: two plays in the same
/// millisecond collapse into the first one.
static SONGPLAYS_TABLE: Table = Table {
    name: "songplays",
    columns: SONGPLAY_COLUMNS,
    indices: &[("idx_songplays_user", "user_id")],
    unique_constraints: &[&["start_time"]],
    upsert: Some(Upsert {
        columns: SONGPLAY_INSERT_COLUMNS,
        conflict_key: &["start_time"],
        action: ConflictAction::DoNothing,
    }),
};

/// Fact table keyed on (start_time, session_id).
static SONGPLAYS_BY_SESSION_TABLE: Table = Table {
    name: "songplays",
    columns: SONGPLAY_COLUMNS,
    indices: &[("idx_songplays_user", "user_id")],
    unique_constraints: &[&["start_time", "session_id"]],
    upsert: Some(Upsert {
        columns: SONGPLAY_INSERT_COLUMNS,
        conflict_key: &["start_time", "session_id"],
        action: ConflictAction::DoNothing,
    }),
};

/// Users are the only mutable dimension: the subscription level follows the
/// most recently loaded row.
static USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("first_name", &SqlType::Text, non_null = true),
        sqlite_column!("last_name", &SqlType::Text, non_null = true),
        sqlite_column!("gender", &SqlType::Text, non_null = true),
        sqlite_column!("level", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
    upsert: Some(Upsert {
        columns: &["user_id", "first_name", "last_name", "gender", "level"],
        conflict_key: &["user_id"],
        action: ConflictAction::UpdateColumns(&["level"]),
    }),
};

static SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ARTISTS_FK)
        ),
        sqlite_column!("year", &SqlType::Integer, non_null = true),
        sqlite_column!("duration", &SqlType::Real, non_null = true),
    ],
    indices: &[("idx_songs_title", "title")],
    unique_constraints: &[],
    upsert: Some(Upsert {
        columns: &["song_id", "title", "artist_id", "year", "duration"],
        conflict_key: &["song_id"],
        action: ConflictAction::DoNothing,
    }),
};

static ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("location", &SqlType::Text, non_null = true),
        sqlite_column!("latitude", &SqlType::Text),
        sqlite_column!("longitude", &SqlType::Text),
    ],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[],
    upsert: Some(Upsert {
        columns: &["artist_id", "name", "location", "latitude", "longitude"],
        conflict_key: &["artist_id"],
        action: ConflictAction::DoNothing,
    }),
};

static TIME_TABLE: Table = Table {
    name: "time",
    columns: &[
        sqlite_column!(
            "start_time",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("hour", &SqlType::Integer, non_null = true),
        sqlite_column!("day", &SqlType::Integer, non_null = true),
        sqlite_column!("week", &SqlType::Integer, non_null = true),
        sqlite_column!("month", &SqlType::Integer, non_null = true),
        sqlite_column!("year", &SqlType::Integer, non_null = true),
        sqlite_column!("weekday", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
    upsert: Some(Upsert {
        columns: &["start_time", "hour", "day", "week", "month", "year", "weekday"],
        conflict_key: &["start_time"],
        action: ConflictAction::DoNothing,
    }),
};

/// Natural key of the fact table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayKey {
    /// One play per millisecond timestamp.
    #[default]
    StartTime,
    /// One play per millisecond timestamp and listening session.
    StartTimeSession,
}

/// The schema's tables, keyed on the given play key.
#[derive(Clone, Copy)]
pub struct WarehouseSchema {
    pub songplays: &'static Table,
    pub users: &'static Table,
    pub songs: &'static Table,
    pub artists: &'static Table,
    pub time: &'static Table,
}

impl WarehouseSchema {
    pub fn new(play_key: PlayKey) -> Self {
        WarehouseSchema {
            songplays: match play_key {
                PlayKey::StartTime => &SONGPLAYS_TABLE,
                PlayKey::StartTimeSession => &SONGPLAYS_BY_SESSION_TABLE,
            },
            users: &USERS_TABLE,
            songs: &SONGS_TABLE,
            artists: &ARTISTS_TABLE,
            time: &TIME_TABLE,
        }
    }

    /// All tables, in row count report order.
    pub fn tables(&self) -> [&'static Table; 5] {
        [self.songplays, self.time, self.users, self.songs, self.artists]
    }

    /// Tables that carry foreign keys, in the order they must be rebuilt.
    pub fn constrained_tables(&self) -> Vec<&'static Table> {
        self.tables()
            .into_iter()
            .filter(|t| t.has_foreign_keys())
            .collect()
    }
}

/// Finds the catalog song played in a log record.
pub const SONG_SELECT: &str = "
    SELECT s.song_id, s.artist_id
    FROM songs AS s
    INNER JOIN artists AS a ON s.artist_id = a.artist_id
    WHERE s.title = ?1
        AND a.name = ?2
        AND s.duration = ?3
    LIMIT 1";

pub const TABLE_ROWCOUNT_CHECK: &str = "
    SELECT
        (SELECT COUNT(*) FROM songplays),
        (SELECT COUNT(*) FROM time),
        (SELECT COUNT(*) FROM users),
        (SELECT COUNT(*) FROM songs),
        (SELECT COUNT(*) FROM artists)";

/// Plays must join exactly one user and one time row. Songs and artists are
/// outer joined since most log records have no catalog match.
pub const DATABASE_INTEGRITY_CHECK: &str = "
    SELECT COUNT(*)
    FROM songplays AS p
    INNER JOIN users AS u ON p.user_id = u.user_id
    INNER JOIN time AS t ON p.start_time = t.start_time
    LEFT OUTER JOIN songs AS s ON p.song_id = s.song_id
    LEFT OUTER JOIN artists AS a ON p.artist_id = a.artist_id";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn create_all(conn: &Connection, schema: &WarehouseSchema) {
        for table in schema.tables() {
            table.create(conn).unwrap();
        }
    }

    #[test]
    fn test_schema_creates_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = WarehouseSchema::new(PlayKey::StartTime);
        create_all(&conn, &schema);
        for table in schema.tables() {
            table.validate(&conn).unwrap();
        }
    }

    #[test]
    fn test_every_table_has_an_upsert() {
        let schema = WarehouseSchema::new(PlayKey::StartTime);
        for table in schema.tables() {
            assert!(table.upsert_sql().is_some(), "{} has no upsert", table.name);
        }
    }

    #[test]
    fn test_only_users_update_on_conflict() {
        let schema = WarehouseSchema::new(PlayKey::StartTime);
        for table in schema.tables() {
            let action = &table.upsert.as_ref().unwrap().action;
            if table.name == "users" {
                assert_eq!(action, &ConflictAction::UpdateColumns(&["level"]));
            } else {
                assert_eq!(action, &ConflictAction::DoNothing);
            }
        }
    }

    #[test]
    fn test_constrained_tables_are_songs_and_songplays() {
        let schema = WarehouseSchema::new(PlayKey::StartTime);
        let names: Vec<&str> = schema.constrained_tables().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["songplays", "songs"]);
    }

    #[test]
    fn test_session_play_key_allows_same_millisecond_in_two_sessions() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = WarehouseSchema::new(PlayKey::StartTimeSession);
        create_all(&conn, &schema);
        let sql = schema.songplays.upsert_sql().unwrap();
        for session_id in [1, 2, 2] {
            conn.execute(
                &sql,
                rusqlite::params![
                    "2018-11-01 21:01:46.796",
                    8,
                    "free",
                    None::<String>,
                    None::<String>,
                    session_id,
                    "Phoenix",
                    "Mozilla"
                ],
            )
            .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM songplays", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_song_select_requires_all_three_fields() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = WarehouseSchema::new(PlayKey::StartTime);
        create_all(&conn, &schema);
        conn.execute_batch(
            "INSERT INTO artists VALUES ('AR1', 'A1', 'L1', NULL, NULL);
             INSERT INTO songs VALUES ('S1', 'T', 'AR1', 2000, 200.5);",
        )
        .unwrap();

        let found = |title: &str, name: &str, duration: f64| -> bool {
            conn.query_row(
                SONG_SELECT,
                rusqlite::params![title, name, duration],
                |_| Ok(()),
            )
            .is_ok()
        };
        assert!(found("T", "A1", 200.5));
        assert!(!found("T", "A1", 200.50001));
        assert!(!found("T", "A2", 200.5));
        assert!(!found("X", "A1", 200.5));
    }
}
