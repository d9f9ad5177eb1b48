use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, UserId};
use crate::time::add_days;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("correct attempts ({correct}) exceed attempts ({attempts})")]
    CorrectExceedsAttempts { attempts: u32, correct: u32 },

    #[error("progress rows exist only after the first attempt")]
    NoAttempts,

    #[error("ease factor {0} is not a finite positive number")]
    InvalidEaseFactor(f64),

    #[error("next review must equal last attempt + interval")]
    ScheduleMismatch,
}

/// Per-(user, card) spaced-repetition ledger.
///
/// Rows are created on the first attempt and only ever updated afterwards.
/// Invariants: `correct_attempts <= attempts`, `attempts >= 1`, and
/// `next_review_at == last_attempt_at + interval_days`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProgress {
    user_id: UserId,
    card_id: CardId,
    attempts: u32,
    correct_attempts: u32,
    last_attempt_at: DateTime<Utc>,
    next_review_at: DateTime<Utc>,
    ease_factor: f64,
    interval_days: u32,
}

impl CardProgress {
    /// Rehydrate a row, re-checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` when a stored row is inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        card_id: CardId,
        attempts: u32,
        correct_attempts: u32,
        last_attempt_at: DateTime<Utc>,
        next_review_at: DateTime<Utc>,
        ease_factor: f64,
        interval_days: u32,
    ) -> Result<Self, ProgressError> {
        if attempts == 0 {
            return Err(ProgressError::NoAttempts);
        }
        if correct_attempts > attempts {
            return Err(ProgressError::CorrectExceedsAttempts {
                attempts,
                correct: correct_attempts,
            });
        }
        if !ease_factor.is_finite() || ease_factor <= 0.0 {
            return Err(ProgressError::InvalidEaseFactor(ease_factor));
        }
        if add_days(last_attempt_at, interval_days) != next_review_at {
            return Err(ProgressError::ScheduleMismatch);
        }
        Ok(Self {
            user_id,
            card_id,
            attempts,
            correct_attempts,
            last_attempt_at,
            next_review_at,
            ease_factor,
            interval_days,
        })
    }

    /// Build the row that results from one more attempt.
    ///
    /// Only the scheduler calls this; it owns the ease/interval policy.
    pub(crate) fn scheduled(
        user_id: UserId,
        card_id: CardId,
        attempts: u32,
        correct_attempts: u32,
        at: DateTime<Utc>,
        ease_factor: f64,
        interval_days: u32,
    ) -> Self {
        Self {
            user_id,
            card_id,
            attempts,
            correct_attempts: correct_attempts.min(attempts),
            last_attempt_at: at,
            next_review_at: add_days(at, interval_days),
            ease_factor,
            interval_days,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn card_id(&self) -> CardId {
        self.card_id
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn correct_attempts(&self) -> u32 {
        self.correct_attempts
    }

    #[must_use]
    pub fn last_attempt_at(&self) -> DateTime<Utc> {
        self.last_attempt_at
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    /// `correct_attempts / attempts`, in `[0, 1]`.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        f64::from(self.correct_attempts) / f64::from(self.attempts)
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// One answer check, appended to the attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub user_id: UserId,
    pub card_id: CardId,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
    /// Time between the card being shown and the answer being checked.
    pub response_time_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn from_persisted_enforces_invariants() {
        let user = UserId::random();
        let card = CardId::new(1);
        let now = fixed_now();

        let err = CardProgress::from_persisted(user, card, 2, 3, now, add_days(now, 1), 2.5, 1)
            .unwrap_err();
        assert!(matches!(err, ProgressError::CorrectExceedsAttempts { .. }));

        let err = CardProgress::from_persisted(user, card, 0, 0, now, now, 2.5, 0).unwrap_err();
        assert_eq!(err, ProgressError::NoAttempts);

        let err = CardProgress::from_persisted(user, card, 1, 1, now, now, 2.5, 3).unwrap_err();
        assert_eq!(err, ProgressError::ScheduleMismatch);

        let err = CardProgress::from_persisted(user, card, 1, 1, now, now, f64::NAN, 0)
            .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidEaseFactor(_)));

        let ok =
            CardProgress::from_persisted(user, card, 4, 3, now, add_days(now, 6), 2.6, 6).unwrap();
        assert!((ok.accuracy() - 0.75).abs() < f64::EPSILON);
        assert!(!ok.is_due(now));
        assert!(ok.is_due(add_days(now, 6)));
    }
}
