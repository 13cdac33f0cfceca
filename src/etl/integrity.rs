//! Post-load verification and deferred foreign keys.

use crate::warehouse::{RowCounts, WarehouseStore};
use anyhow::Result;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityVerdict {
    /// Every play joins a user and a time row; the foreign keys are now in place.
    ConstraintsApplied,
    /// Every play joins, and a previous run already applied the foreign keys.
    AlreadyApplied,
    /// Some plays do not join; the tables are left unconstrained.
    Mismatch { matched: i64, total: i64 },
    /// The join check passed but the rebuilt tables violated their foreign keys.
    Violations(usize),
}

impl IntegrityVerdict {
    pub fn is_constrained(&self) -> bool {
        matches!(
            self,
            IntegrityVerdict::ConstraintsApplied | IntegrityVerdict::AlreadyApplied
        )
    }
}

impl fmt::Display for IntegrityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityVerdict::ConstraintsApplied => write!(f, "foreign keys applied"),
            IntegrityVerdict::AlreadyApplied => write!(f, "foreign keys already in place"),
            IntegrityVerdict::Mismatch { matched, total } => write!(
                f,
                "{} of {} plays do not join, foreign keys not applied",
                total - matched,
                total
            ),
            IntegrityVerdict::Violations(count) => write!(
                f,
                "{} rows violate the foreign keys, foreign keys not applied",
                count
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    pub counts: RowCounts,
    pub matched: i64,
    pub total: i64,
    pub verdict: IntegrityVerdict,
}

fn log_row_counts(counts: &RowCounts) {
    info!("Row counts:");
    info!("  songplays: {}", counts.songplays);
    info!("  time:      {}", counts.time);
    info!("  users:     {}", counts.users);
    info!("  songs:     {}", counts.songs);
    info!("  artists:   {}", counts.artists);
}

/// Checks that every play joins exactly one user and one time row, and only
/// then puts the deferred foreign keys in place.
///
/// A failed check is not an error: the report carries the verdict and the
/// tables stay as loaded.
pub fn verify(store: &dyn WarehouseStore) -> Result<IntegrityReport> {
    let counts = store.row_counts()?;
    log_row_counts(&counts);

    let matched = store.count_integrity_matches()?;
    let total = counts.songplays;
    info!("Matched rows: {} of {}", matched, total);

    let verdict = if matched != total {
        IntegrityVerdict::Mismatch { matched, total }
    } else if store.foreign_keys_applied()? {
        IntegrityVerdict::AlreadyApplied
    } else {
        match store.apply_foreign_keys()? {
            0 => IntegrityVerdict::ConstraintsApplied,
            violations => IntegrityVerdict::Violations(violations),
        }
    };

    match verdict {
        IntegrityVerdict::ConstraintsApplied | IntegrityVerdict::AlreadyApplied => {
            info!("Integrity check passed: {}", verdict)
        }
        IntegrityVerdict::Mismatch { .. } => error!("Integrity check failed: {}", verdict),
        IntegrityVerdict::Violations(_) => warn!("Integrity check failed: {}", verdict),
    }

    Ok(IntegrityReport {
        counts,
        matched,
        total,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{SongPlay, SqliteWarehouseStore, StoreOptions, TimeRow, User};

    fn store() -> SqliteWarehouseStore {
        SqliteWarehouseStore::open_in_memory(&StoreOptions::default()).unwrap()
    }

    fn load_play(store: &SqliteWarehouseStore, ts: i64, user_id: i64, with_user: bool) {
        let time = TimeRow::from_epoch_millis(ts).unwrap();
        store.insert_time(&time).unwrap();
        if with_user {
            store
                .upsert_user(&User {
                    user_id,
                    first_name: "Lily".to_string(),
                    last_name: "Koch".to_string(),
                    gender: "F".to_string(),
                    level: "paid".to_string(),
                })
                .unwrap();
        }
        store
            .insert_songplay(&SongPlay {
                start_time: time.start_time,
                user_id,
                level: "paid".to_string(),
                song: None,
                session_id: 1,
                location: "Chicago".to_string(),
                user_agent: "Agent".to_string(),
            })
            .unwrap();
    }

    #[test]
    fn test_empty_warehouse_gets_constraints() {
        let store = store();
        let report = verify(&store).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.verdict, IntegrityVerdict::ConstraintsApplied);
        assert!(store.foreign_keys_applied().unwrap());
    }

    #[test]
    fn test_second_verification_reports_already_applied() {
        let store = store();
        load_play(&store, 1_542_241_826_796, 15, true);

        assert_eq!(
            verify(&store).unwrap().verdict,
            IntegrityVerdict::ConstraintsApplied
        );
        let again = verify(&store).unwrap();
        assert_eq!(again.verdict, IntegrityVerdict::AlreadyApplied);
        assert!(again.verdict.is_constrained());
    }

    #[test]
    fn test_missing_user_is_a_mismatch() {
        let store = store();
        load_play(&store, 1_542_241_826_796, 15, true);
        load_play(&store, 1_542_241_900_000, 99, false);

        let report = verify(&store).unwrap();
        assert_eq!(
            report.verdict,
            IntegrityVerdict::Mismatch {
                matched: 1,
                total: 2
            }
        );
        assert!(!report.verdict.is_constrained());
        assert!(!store.foreign_keys_applied().unwrap());
    }

    #[test]
    fn test_verdict_display() {
        let verdict = IntegrityVerdict::Mismatch {
            matched: 9,
            total: 10,
        };
        assert_eq!(
            verdict.to_string(),
            "1 of 10 plays do not join, foreign keys not applied"
        );
    }
}
