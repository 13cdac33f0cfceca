//! Parsing of the raw song catalog and activity log files.

mod activity_record;
mod error;
mod song_record;

pub use activity_record::{ActivityLog, PlayRecord, Plays, NEXT_SONG_PAGE};
pub use error::RecordError;
pub use song_record::SongRecord;
