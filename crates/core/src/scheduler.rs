use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AttemptRecord, CardId, CardProgress, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("ease floor must be finite and > 0, got {0}")]
    InvalidFloor(f64),
    #[error("initial ease {initial} must lie within [{floor}, {ceiling}]")]
    InitialOutOfBounds {
        initial: f64,
        floor: f64,
        ceiling: f64,
    },
    #[error("ease steps must be finite and >= 0")]
    InvalidStep,
    #[error("relearn interval must be <= max interval")]
    InvalidIntervals,
    #[error("progress belongs to another user or card")]
    LedgerMismatch,
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Tunables for the ease-factor schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    initial_ease: f64,
    min_ease: f64,
    max_ease: f64,
    ease_bonus: f64,
    ease_penalty: f64,
    relearn_interval_days: u32,
    max_interval_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            min_ease: 1.3,
            max_ease: 3.0,
            ease_bonus: 0.1,
            ease_penalty: 0.2,
            relearn_interval_days: 1,
            max_interval_days: 365,
        }
    }
}

impl SchedulerConfig {
    /// # Errors
    ///
    /// Returns `SchedulerError` if the bounds are inconsistent.
    pub fn new(
        initial_ease: f64,
        min_ease: f64,
        max_ease: f64,
        ease_bonus: f64,
        ease_penalty: f64,
        relearn_interval_days: u32,
        max_interval_days: u32,
    ) -> Result<Self, SchedulerError> {
        if !min_ease.is_finite() || min_ease <= 0.0 {
            return Err(SchedulerError::InvalidFloor(min_ease));
        }
        if !initial_ease.is_finite()
            || !max_ease.is_finite()
            || initial_ease < min_ease
            || initial_ease > max_ease
        {
            return Err(SchedulerError::InitialOutOfBounds {
                initial: initial_ease,
                floor: min_ease,
                ceiling: max_ease,
            });
        }
        let step_ok = |s: f64| s.is_finite() && s >= 0.0;
        if !step_ok(ease_bonus) || !step_ok(ease_penalty) {
            return Err(SchedulerError::InvalidStep);
        }
        if max_interval_days == 0 || relearn_interval_days > max_interval_days {
            return Err(SchedulerError::InvalidIntervals);
        }
        Ok(Self {
            initial_ease,
            min_ease,
            max_ease,
            ease_bonus,
            ease_penalty,
            relearn_interval_days,
            max_interval_days,
        })
    }

    #[must_use]
    pub fn initial_ease(&self) -> f64 {
        self.initial_ease
    }

    #[must_use]
    pub fn min_ease(&self) -> f64 {
        self.min_ease
    }

    #[must_use]
    pub fn max_ease(&self) -> f64 {
        self.max_ease
    }

    #[must_use]
    pub fn max_interval_days(&self) -> u32 {
        self.max_interval_days
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Result of applying one attempt: the new ledger row and the log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAttempt {
    pub progress: CardProgress,
    pub attempt: AttemptRecord,
}

/// Ease-factor spaced-repetition schedule.
///
/// - correct: `interval = max(interval + 1, round(interval * ease))`, capped,
///   and the ease grows by `ease_bonus` up to `max_ease`.
/// - incorrect: `interval = relearn_interval_days` and the ease shrinks by
///   `ease_penalty`, never below `min_ease`.
///
/// ```
/// # use hsc_core::scheduler::Scheduler;
/// # use hsc_core::model::{CardId, UserId};
/// let scheduler = Scheduler::default();
/// let now = chrono::Utc::now();
/// let applied = scheduler
///     .apply_attempt(UserId::random(), CardId::new(1), None, true, now, None)
///     .unwrap();
/// assert_eq!(applied.progress.interval_days(), 1);
/// assert_eq!(applied.progress.attempts(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Next interval after a correct answer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn grow_interval(&self, interval_days: u32, ease: f64) -> u32 {
        let scaled = (f64::from(interval_days) * ease).round();
        let scaled = if scaled >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            scaled.max(0.0) as u32
        };
        scaled
            .max(interval_days.saturating_add(1))
            .min(self.config.max_interval_days)
    }

    /// Apply one attempt to the (possibly absent) ledger row.
    ///
    /// `previous` is `None` on the first attempt for this user and card.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::LedgerMismatch` if `previous` belongs to
    /// another user or card.
    pub fn apply_attempt(
        &self,
        user_id: UserId,
        card_id: CardId,
        previous: Option<&CardProgress>,
        is_correct: bool,
        at: DateTime<Utc>,
        response_time_ms: Option<u64>,
    ) -> Result<AppliedAttempt, SchedulerError> {
        if let Some(prev) = previous {
            if prev.user_id() != user_id || prev.card_id() != card_id {
                return Err(SchedulerError::LedgerMismatch);
            }
        }

        let (attempts, correct, ease, interval) = previous.map_or(
            (0, 0, self.config.initial_ease, 0),
            |p| {
                (
                    p.attempts(),
                    p.correct_attempts(),
                    p.ease_factor(),
                    p.interval_days(),
                )
            },
        );

        let (next_ease, next_interval) = if is_correct {
            (
                (ease + self.config.ease_bonus).min(self.config.max_ease),
                self.grow_interval(interval, ease),
            )
        } else {
            (
                (ease - self.config.ease_penalty).max(self.config.min_ease),
                self.config.relearn_interval_days,
            )
        };

        let progress = CardProgress::scheduled(
            user_id,
            card_id,
            attempts.saturating_add(1),
            if is_correct {
                correct.saturating_add(1)
            } else {
                correct
            },
            at,
            next_ease,
            next_interval,
        );

        Ok(AppliedAttempt {
            progress,
            attempt: AttemptRecord {
                user_id,
                card_id,
                is_correct,
                answered_at: at,
                response_time_ms,
            },
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{add_days, fixed_now};
    use chrono::Duration;

    fn run(scheduler: &Scheduler, answers: &[bool]) -> Vec<CardProgress> {
        let user = UserId::random();
        let mut rows: Vec<CardProgress> = Vec::new();
        for (i, &correct) in answers.iter().enumerate() {
            let at = fixed_now() + Duration::hours(i as i64 * 30);
            let applied = scheduler
                .apply_attempt(user, CardId::new(1), rows.last(), correct, at, None)
                .unwrap();
            rows.push(applied.progress);
        }
        rows
    }

    #[test]
    fn first_correct_answer_schedules_one_day() {
        let rows = run(&Scheduler::default(), &[true]);
        let row = &rows[0];
        assert_eq!(row.attempts(), 1);
        assert_eq!(row.correct_attempts(), 1);
        assert_eq!(row.interval_days(), 1);
        assert!((row.ease_factor() - 2.6).abs() < 1e-9);
        assert_eq!(row.next_review_at(), add_days(row.last_attempt_at(), 1));
    }

    #[test]
    fn intervals_grow_by_ease_on_streaks() {
        let rows = run(&Scheduler::default(), &[true, true, true, true]);
        let intervals: Vec<u32> = rows.iter().map(CardProgress::interval_days).collect();
        // 0 -> 1 (min step), 1*2.6 -> 3, 3*2.7 -> 8, 8*2.8 -> 22
        assert_eq!(intervals, vec![1, 3, 8, 22]);
    }

    #[test]
    fn incorrect_answer_resets_interval_and_lowers_ease() {
        let rows = run(&Scheduler::default(), &[true, true, true, false]);
        let last = rows.last().unwrap();
        assert_eq!(last.interval_days(), 1);
        assert_eq!(last.attempts(), 4);
        assert_eq!(last.correct_attempts(), 3);
        assert!((last.ease_factor() - 2.6).abs() < 1e-9);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let scheduler = Scheduler::default();
        let rows = run(&scheduler, &[false; 25]);
        for row in &rows {
            assert!(row.ease_factor() >= scheduler.config().min_ease());
        }
        assert!((rows.last().unwrap().ease_factor() - 1.3).abs() < 1e-9);
    }

    #[test]
    fn ease_never_exceeds_ceiling_and_interval_is_capped() {
        let scheduler = Scheduler::default();
        let rows = run(&scheduler, &[true; 30]);
        let last = rows.last().unwrap();
        assert!(last.ease_factor() <= scheduler.config().max_ease() + 1e-9);
        assert_eq!(last.interval_days(), 365);
    }

    #[test]
    fn ledger_invariants_hold_for_mixed_sequences() {
        let pattern = [true, false, true, true, false, false, true, true, true, false, true];
        for row in run(&Scheduler::default(), &pattern) {
            assert!(row.correct_attempts() <= row.attempts());
            assert_eq!(
                row.next_review_at(),
                add_days(row.last_attempt_at(), row.interval_days())
            );
        }
    }

    #[test]
    fn attempt_record_mirrors_input() {
        let user = UserId::random();
        let applied = Scheduler::default()
            .apply_attempt(user, CardId::new(5), None, false, fixed_now(), Some(4_200))
            .unwrap();
        assert_eq!(applied.attempt.user_id, user);
        assert!(!applied.attempt.is_correct);
        assert_eq!(applied.attempt.response_time_ms, Some(4_200));
        assert_eq!(applied.progress.interval_days(), 1);
    }

    #[test]
    fn rejects_foreign_ledger() {
        let rows = run(&Scheduler::default(), &[true]);
        let err = Scheduler::default()
            .apply_attempt(UserId::random(), CardId::new(1), rows.last(), true, fixed_now(), None)
            .unwrap_err();
        assert_eq!(err, SchedulerError::LedgerMismatch);
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            SchedulerConfig::new(2.5, 0.0, 3.0, 0.1, 0.2, 1, 365),
            Err(SchedulerError::InvalidFloor(_))
        ));
        assert!(matches!(
            SchedulerConfig::new(1.0, 1.3, 3.0, 0.1, 0.2, 1, 365),
            Err(SchedulerError::InitialOutOfBounds { .. })
        ));
        assert_eq!(
            SchedulerConfig::new(2.5, 1.3, 3.0, -0.1, 0.2, 1, 365),
            Err(SchedulerError::InvalidStep)
        );
        assert_eq!(
            SchedulerConfig::new(2.5, 1.3, 3.0, 0.1, 0.2, 10, 5),
            Err(SchedulerError::InvalidIntervals)
        );
        assert!(SchedulerConfig::new(2.5, 1.3, 3.0, 0.1, 0.2, 1, 365).is_ok());
    }
}
