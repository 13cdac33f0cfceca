//! Activity log loading: time rows, users, then song plays.

use crate::records::{ActivityLog, PlayRecord, RecordError};
use crate::warehouse::{SongMatch, SongPlay, User, WarehouseStore};
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::path::Path;
use tracing::debug;

/// Which row decides a user's stored level when it changes within a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Distinct (user, level) combinations are upserted in order of first
    /// appearance; the last one upserted wins.
    #[default]
    Appearance,
    /// The combination seen on the chronologically last play wins.
    LatestEvent,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogFileStats {
    pub plays: usize,
    pub time_rows_inserted: usize,
    pub users_upserted: usize,
    pub songplays_inserted: usize,
    pub songs_matched: usize,
}

impl AddAssign for LogFileStats {
    fn add_assign(&mut self, other: Self) {
        self.plays += other.plays;
        self.time_rows_inserted += other.time_rows_inserted;
        self.users_upserted += other.users_upserted;
        self.songplays_inserted += other.songplays_inserted;
        self.songs_matched += other.songs_matched;
    }
}

/// Collects the distinct users of a file, in the order they must be upserted.
pub fn distinct_users<I>(plays: I, policy: LevelPolicy) -> Result<Vec<User>, RecordError>
where
    I: IntoIterator<Item = Result<PlayRecord, RecordError>>,
{
    let mut positions: HashMap<User, usize> = HashMap::new();
    // Each distinct row with the latest timestamp it was seen at
    let mut rows: Vec<(User, i64)> = Vec::new();

    for play in plays {
        let play = play?;
        let user = play.user();
        match positions.get(&user) {
            Some(&position) => {
                let last_seen = &mut rows[position].1;
                *last_seen = (*last_seen).max(play.ts);
            }
            None => {
                positions.insert(user.clone(), rows.len());
                rows.push((user, play.ts));
            }
        }
    }

    if policy == LevelPolicy::LatestEvent {
        // Stable, so ties keep their order of appearance
        rows.sort_by_key(|(_, last_seen)| *last_seen);
    }
    Ok(rows.into_iter().map(|(user, _)| user).collect())
}

fn resolve_song(store: &dyn WarehouseStore, play: &PlayRecord) -> Result<Option<SongMatch>> {
    match (&play.song, &play.artist, play.length) {
        (Some(title), Some(artist), Some(length)) => store.find_song(title, artist, length),
        _ => Ok(None),
    }
}

/// Loads one activity log file.
///
/// Time rows are written before users, and users before plays, so that every
/// play can reference rows that already exist.
pub fn process_log_file(
    store: &dyn WarehouseStore,
    path: &Path,
    level_policy: LevelPolicy,
) -> Result<LogFileStats> {
    let log = ActivityLog::new(path);
    let mut stats = LogFileStats::default();

    for play in log.plays()? {
        let time = play?.time_row()?;
        stats.plays += 1;
        if store.insert_time(&time)? {
            stats.time_rows_inserted += 1;
        }
    }

    for user in distinct_users(log.plays()?, level_policy)? {
        store.upsert_user(&user)?;
        stats.users_upserted += 1;
    }

    for play in log.plays()? {
        let play = play?;
        let song = resolve_song(store, &play)?;
        if song.is_some() {
            stats.songs_matched += 1;
        }
        let songplay = SongPlay {
            start_time: play.time_row()?.start_time,
            user_id: play.user_id,
            level: play.level,
            song,
            session_id: play.session_id,
            location: play.location,
            user_agent: play.user_agent,
        };
        if store.insert_songplay(&songplay)? {
            stats.songplays_inserted += 1;
        } else {
            debug!("Play at {} already loaded, ignoring", songplay.start_time);
        }
    }

    debug!("Loaded {}: {:?}", log.path().display(), stats);
    Ok(stats)
}
