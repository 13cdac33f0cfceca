//! WarehouseStore trait definition.
//!
//! Loaders and the integrity verifier only talk to the database through this
//! trait, so a run can be driven against any backend able to execute the
//! schema's parameterized statements.

use super::models::{Artist, RowCounts, Song, SongMatch, SongPlay, TimeRow, User};
use anyhow::Result;

pub trait WarehouseStore {
    // =========================================================================
    // Dimension and Fact Writes
    // =========================================================================

    /// Inserts a song. Returns false when the song id already exists.
    fn insert_song(&self, song: &Song) -> Result<bool>;

    /// Inserts an artist. Returns false when the artist id already exists.
    fn insert_artist(&self, artist: &Artist) -> Result<bool>;

    /// Inserts a time row. Returns false when the start time already exists.
    fn insert_time(&self, time: &TimeRow) -> Result<bool>;

    /// Inserts a user, or overwrites the stored level of an existing one.
    fn upsert_user(&self, user: &User) -> Result<()>;

    /// Inserts a play. Returns false when the play key already exists.
    fn insert_songplay(&self, play: &SongPlay) -> Result<bool>;

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Finds the catalog song with exactly this title, artist name and duration.
    fn find_song(&self, title: &str, artist_name: &str, duration: f64)
        -> Result<Option<SongMatch>>;

    // =========================================================================
    // Transactions
    // =========================================================================

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    // =========================================================================
    // Verification
    // =========================================================================

    fn row_counts(&self) -> Result<RowCounts>;

    /// Number of plays joining exactly one user and one time row.
    fn count_integrity_matches(&self) -> Result<i64>;

    /// Whether every declared foreign key is in place.
    fn foreign_keys_applied(&self) -> Result<bool>;

    /// Rebuilds the constrained tables with their foreign keys.
    ///
    /// Returns the number of rows violating the new constraints; when it is
    /// not zero nothing is changed.
    fn apply_foreign_keys(&self) -> Result<usize>;
}
