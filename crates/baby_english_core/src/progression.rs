//! crates/baby_english_core/src/progression.rs
//!
//! Accumulates a learner's score over a session and raises their age level
//! when the next threshold is reached.

use crate::domain::AgeLevel;
use crate::ports::{PortError, UserStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cumulative score needed to leave each level: `LEVEL_THRESHOLDS[n]` moves a
/// learner from level `n` to `n + 1`.
pub const LEVEL_THRESHOLDS: [u32; 18] = [
    10, 25, 50, 100, 200, 350, 500, 700, 900, 1200, 1500, 1800, 2200, 2600, 3000, 3500, 4000, 5000,
];

/// Score needed to leave `level`, or `None` at the terminal level.
pub fn threshold_for(level: AgeLevel) -> Option<u32> {
    LEVEL_THRESHOLDS.get(level.value() as usize).copied()
}

/// A level-up that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressionWarning {
    PersistenceFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelChange {
    Unchanged,
    LeveledUp { from: AgeLevel, to: AgeLevel },
    /// The threshold was crossed but the new level was not stored. The local
    /// level is unchanged and the next score retries.
    Reverted { attempted: AgeLevel, warning: ProgressionWarning },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub cumulative_score: u32,
    pub age_level: AgeLevel,
    pub change: LevelChange,
}

pub struct ProgressionTracker {
    user_id: Uuid,
    cumulative_score: u32,
    age_level: AgeLevel,
    users: Arc<dyn UserStore>,
    persist_timeout: Duration,
}

impl ProgressionTracker {
    pub fn new(
        user_id: Uuid,
        age_level: AgeLevel,
        users: Arc<dyn UserStore>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            user_id,
            cumulative_score: 0,
            age_level,
            users,
            persist_timeout,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn cumulative_score(&self) -> u32 {
        self.cumulative_score
    }

    pub fn age_level(&self) -> AgeLevel {
        self.age_level
    }

    /// Adopts the level currently stored for the learner, which may have been
    /// changed by another session or set explicitly.
    pub fn sync_age_level(&mut self, stored: AgeLevel) {
        if stored != self.age_level {
            debug!(
                user_id = %self.user_id,
                from = %self.age_level,
                to = %stored,
                "Synced stored age level"
            );
            self.age_level = stored;
        }
    }

    /// Adds `points` and performs at most one level-up.
    ///
    /// The level only changes once the user store has accepted it. The store
    /// write is monotonic, so a stale tracker can never lower a stored level.
    pub async fn add_score(&mut self, points: u32) -> ScoreUpdate {
        self.cumulative_score = self.cumulative_score.saturating_add(points);

        let change = match self.pending_level() {
            Some(next) => self.commit_level(next).await,
            None => LevelChange::Unchanged,
        };

        ScoreUpdate {
            cumulative_score: self.cumulative_score,
            age_level: self.age_level,
            change,
        }
    }

    fn pending_level(&self) -> Option<AgeLevel> {
        let threshold = threshold_for(self.age_level)?;
        if self.cumulative_score >= threshold {
            self.age_level.next()
        } else {
            None
        }
    }

    async fn commit_level(&mut self, next: AgeLevel) -> LevelChange {
        let persisted = tokio::time::timeout(
            self.persist_timeout,
            self.users.raise_age_level(self.user_id, next),
        )
        .await
        .unwrap_or_else(|_| Err(PortError::Timeout(self.persist_timeout.as_millis() as u64)));

        match persisted {
            Ok(stored) => {
                let from = self.age_level;
                // The store never lowers a level, so a higher stored level wins.
                let to = stored.age_level.max(next);
                self.age_level = to;
                info!(user_id = %self.user_id, %from, %to, "Learner leveled up");
                LevelChange::LeveledUp { from, to }
            }
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    attempted = %next,
                    error = %e,
                    "Failed to persist level-up, keeping current level"
                );
                LevelChange::Reverted {
                    attempted: next,
                    warning: ProgressionWarning::PersistenceFailure(e.to_string()),
                }
            }
        }
    }
}
