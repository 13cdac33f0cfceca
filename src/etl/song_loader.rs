//! Song catalog loading.

use crate::records::SongRecord;
use crate::warehouse::WarehouseStore;
use anyhow::Result;
use std::ops::AddAssign;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SongFileStats {
    pub songs_inserted: usize,
    pub artists_inserted: usize,
}

impl AddAssign for SongFileStats {
    fn add_assign(&mut self, other: Self) {
        self.songs_inserted += other.songs_inserted;
        self.artists_inserted += other.artists_inserted;
    }
}

/// Loads the song and the artist of one catalog file.
///
/// The song is written before its artist: the songs -> artists reference is
/// only enforced after the whole run has been verified.
pub fn process_song_file(store: &dyn WarehouseStore, path: &Path) -> Result<SongFileStats> {
    let record = SongRecord::read(path)?;
    let mut stats = SongFileStats::default();

    if store.insert_song(&record.song())? {
        stats.songs_inserted += 1;
    } else {
        debug!("Song {} already loaded", record.song_id);
    }
    if store.insert_artist(&record.artist())? {
        stats.artists_inserted += 1;
    } else {
        debug!("Artist {} already loaded", record.artist_id);
    }
    Ok(stats)
}
