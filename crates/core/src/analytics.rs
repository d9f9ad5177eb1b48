//! Read models recomputed from the progress ledger and the attempt log.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AttemptRecord, BookId, CardId, CardProgress};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnalyticsError {
    #[error("mastery accuracy must lie within [0, 1], got {0}")]
    InvalidAccuracy(f64),
}

//
// ─── MASTERY ───────────────────────────────────────────────────────────────────
//

/// When a card counts as mastered for a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasteryThreshold {
    min_accuracy: f64,
    min_attempts: u32,
    min_interval_days: u32,
}

impl Default for MasteryThreshold {
    fn default() -> Self {
        Self {
            min_accuracy: 0.8,
            min_attempts: 3,
            min_interval_days: 7,
        }
    }
}

impl MasteryThreshold {
    /// # Errors
    ///
    /// Returns `AnalyticsError::InvalidAccuracy` when `min_accuracy` is outside `[0, 1]`.
    pub fn new(
        min_accuracy: f64,
        min_attempts: u32,
        min_interval_days: u32,
    ) -> Result<Self, AnalyticsError> {
        if !(0.0..=1.0).contains(&min_accuracy) {
            return Err(AnalyticsError::InvalidAccuracy(min_accuracy));
        }
        Ok(Self {
            min_accuracy,
            min_attempts,
            min_interval_days,
        })
    }

    #[must_use]
    pub fn min_accuracy(&self) -> f64 {
        self.min_accuracy
    }

    #[must_use]
    pub fn min_attempts(&self) -> u32 {
        self.min_attempts
    }

    #[must_use]
    pub fn min_interval_days(&self) -> u32 {
        self.min_interval_days
    }

    #[must_use]
    pub fn is_mastered(&self, progress: &CardProgress) -> bool {
        progress.attempts() >= self.min_attempts
            && progress.accuracy() >= self.min_accuracy
            && progress.interval_days() >= self.min_interval_days
    }
}

//
// ─── PER TEXT ──────────────────────────────────────────────────────────────────
//

/// An active card and the book its quote belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOrigin {
    pub card_id: CardId,
    pub book_id: BookId,
    pub book_title: String,
}

/// Flashcard statistics of one user for one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProgress {
    pub book_id: BookId,
    pub book_title: String,
    pub total_flashcards: u32,
    pub mastered_flashcards: u32,
    /// Mean per-card accuracy over attempted cards; 0 when none were attempted.
    pub average_accuracy: f64,
    /// Mean recorded response time in seconds.
    pub completion_time_secs: Option<f64>,
}

#[derive(Default)]
struct TextAccumulator {
    title: String,
    total: u32,
    mastered: u32,
    accuracy_sum: f64,
    attempted: u32,
    response_ms_sum: u64,
    responses: u32,
}

/// Group the user's ledger by book.
///
/// `cards` lists every active card with its book; progress rows and attempts
/// for cards outside that list are ignored. Result is ordered by book title.
#[must_use]
pub fn flashcard_progress(
    cards: &[CardOrigin],
    progress: &[CardProgress],
    attempts: &[AttemptRecord],
    threshold: &MasteryThreshold,
) -> Vec<TextProgress> {
    let ledger: HashMap<CardId, &CardProgress> =
        progress.iter().map(|p| (p.card_id(), p)).collect();
    let mut book_of: HashMap<CardId, BookId> = HashMap::with_capacity(cards.len());
    let mut books: BTreeMap<BookId, TextAccumulator> = BTreeMap::new();

    for origin in cards {
        if book_of.insert(origin.card_id, origin.book_id).is_some() {
            continue;
        }
        let acc = books.entry(origin.book_id).or_default();
        acc.title.clone_from(&origin.book_title);
        acc.total = acc.total.saturating_add(1);
        if let Some(row) = ledger.get(&origin.card_id) {
            acc.attempted = acc.attempted.saturating_add(1);
            acc.accuracy_sum += row.accuracy();
            if threshold.is_mastered(row) {
                acc.mastered = acc.mastered.saturating_add(1);
            }
        }
    }

    for attempt in attempts {
        let (Some(book), Some(ms)) = (book_of.get(&attempt.card_id), attempt.response_time_ms)
        else {
            continue;
        };
        if let Some(acc) = books.get_mut(book) {
            acc.response_ms_sum = acc.response_ms_sum.saturating_add(ms);
            acc.responses = acc.responses.saturating_add(1);
        }
    }

    let mut out: Vec<TextProgress> = books
        .into_iter()
        .map(|(book_id, acc)| TextProgress {
            book_id,
            book_title: acc.title,
            total_flashcards: acc.total,
            mastered_flashcards: acc.mastered,
            average_accuracy: if acc.attempted == 0 {
                0.0
            } else {
                acc.accuracy_sum / f64::from(acc.attempted)
            },
            completion_time_secs: (acc.responses > 0)
                .then(|| mean_secs(acc.response_ms_sum, acc.responses)),
        })
        .collect();
    out.sort_by(|a, b| {
        a.book_title
            .to_lowercase()
            .cmp(&b.book_title.to_lowercase())
            .then(a.book_id.cmp(&b.book_id))
    });
    out
}

#[allow(clippy::cast_precision_loss)]
fn mean_secs(total_ms: u64, count: u32) -> f64 {
    total_ms as f64 / 1000.0 / f64::from(count)
}

//
// ─── PER USER ──────────────────────────────────────────────────────────────────
//

/// Overall study summary for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub cards_studied: u32,
    pub cards_mastered: u32,
    pub cards_due: u32,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub accuracy: f64,
    /// Consecutive UTC days with at least one attempt, ending today
    /// (or yesterday when nothing was answered yet today).
    pub current_streak_days: u32,
}

#[must_use]
pub fn user_progress(
    progress: &[CardProgress],
    attempts: &[AttemptRecord],
    threshold: &MasteryThreshold,
    now: DateTime<Utc>,
) -> UserProgress {
    let mut summary = UserProgress {
        cards_studied: 0,
        cards_mastered: 0,
        cards_due: 0,
        total_attempts: 0,
        correct_attempts: 0,
        accuracy: 0.0,
        current_streak_days: current_streak(attempts, now.date_naive()),
    };
    for row in progress {
        summary.cards_studied = summary.cards_studied.saturating_add(1);
        summary.total_attempts = summary.total_attempts.saturating_add(row.attempts());
        summary.correct_attempts = summary
            .correct_attempts
            .saturating_add(row.correct_attempts());
        if threshold.is_mastered(row) {
            summary.cards_mastered = summary.cards_mastered.saturating_add(1);
        }
        if row.is_due(now) {
            summary.cards_due = summary.cards_due.saturating_add(1);
        }
    }
    if summary.total_attempts > 0 {
        summary.accuracy =
            f64::from(summary.correct_attempts) / f64::from(summary.total_attempts);
    }
    summary
}

fn current_streak(attempts: &[AttemptRecord], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = attempts
        .iter()
        .map(|a| a.answered_at.date_naive())
        .collect();
    let mut day = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };
    let mut streak = 0_u32;
    while days.contains(&day) {
        streak = streak.saturating_add(1);
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

//
// ─── WEEKLY ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayActivity {
    pub day: NaiveDate,
    pub attempts: u32,
    pub correct: u32,
}

/// Seven UTC days ending today, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub days: Vec<DayActivity>,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub accuracy: f64,
    /// Cards mastered now whose last attempt fell inside the window.
    pub cards_mastered: u32,
}

pub const REPORT_DAYS: i64 = 7;

/// Start of the weekly window (midnight UTC six days before `now`).
#[must_use]
pub fn weekly_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (today_start, _) = crate::time::utc_day_bounds(now);
    today_start - Duration::days(REPORT_DAYS - 1)
}

#[must_use]
pub fn weekly_report(
    progress: &[CardProgress],
    attempts: &[AttemptRecord],
    threshold: &MasteryThreshold,
    now: DateTime<Utc>,
) -> WeeklyReport {
    let window_start = weekly_window_start(now);
    let first_day = window_start.date_naive();
    let mut days: Vec<DayActivity> = first_day
        .iter_days()
        .take(7)
        .map(|day| DayActivity {
            day,
            attempts: 0,
            correct: 0,
        })
        .collect();

    let mut total = 0_u32;
    let mut correct = 0_u32;
    for attempt in attempts {
        let Some(slot) = days
            .iter_mut()
            .find(|d| d.day == attempt.answered_at.date_naive())
        else {
            continue;
        };
        slot.attempts = slot.attempts.saturating_add(1);
        total = total.saturating_add(1);
        if attempt.is_correct {
            slot.correct = slot.correct.saturating_add(1);
            correct = correct.saturating_add(1);
        }
    }

    let cards_mastered = progress
        .iter()
        .filter(|row| row.last_attempt_at() >= window_start && threshold.is_mastered(row))
        .count();

    WeeklyReport {
        days,
        total_attempts: total,
        correct_attempts: correct,
        accuracy: if total == 0 {
            0.0
        } else {
            f64::from(correct) / f64::from(total)
        },
        cards_mastered: u32::try_from(cards_mastered).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::time::{add_days, fixed_now};

    fn row(user: UserId, card: u64, attempts: u32, correct: u32, interval: u32) -> CardProgress {
        let at = fixed_now();
        CardProgress::from_persisted(
            user,
            CardId::new(card),
            attempts,
            correct,
            at,
            add_days(at, interval),
            2.5,
            interval,
        )
        .unwrap()
    }

    fn origin(card: u64, book: u64, title: &str) -> CardOrigin {
        CardOrigin {
            card_id: CardId::new(card),
            book_id: BookId::new(book),
            book_title: title.to_string(),
        }
    }

    fn attempt(user: UserId, card: u64, correct: bool, at: DateTime<Utc>, ms: Option<u64>) -> AttemptRecord {
        AttemptRecord {
            user_id: user,
            card_id: CardId::new(card),
            is_correct: correct,
            answered_at: at,
            response_time_ms: ms,
        }
    }

    #[test]
    fn mastery_aggregate_for_a_single_text() {
        let user = UserId::random();
        let cards = vec![origin(1, 1, "1984"), origin(2, 1, "1984"), origin(3, 1, "1984")];
        let progress = vec![
            row(user, 1, 3, 3, 10),
            row(user, 2, 10, 9, 8),
            row(user, 3, 5, 2, 1),
        ];

        let stats = flashcard_progress(&cards, &progress, &[], &MasteryThreshold::default());
        assert_eq!(stats.len(), 1);
        let text = &stats[0];
        assert_eq!(text.book_title, "1984");
        assert_eq!(text.total_flashcards, 3);
        assert_eq!(text.mastered_flashcards, 2);
        assert!((text.average_accuracy - 0.7667).abs() < 1e-3);
        assert_eq!(text.completion_time_secs, None);
    }

    #[test]
    fn unattempted_cards_count_toward_total_only() {
        let user = UserId::random();
        let cards = vec![
            origin(1, 2, "Macbeth"),
            origin(2, 2, "Macbeth"),
            origin(3, 1, "1984"),
        ];
        let progress = vec![row(user, 1, 4, 2, 1)];
        let attempts = vec![
            attempt(user, 1, true, fixed_now(), Some(2_000)),
            attempt(user, 1, false, fixed_now(), Some(4_000)),
            attempt(user, 1, true, fixed_now(), None),
        ];

        let stats = flashcard_progress(&cards, &progress, &attempts, &MasteryThreshold::default());
        let titles: Vec<&str> = stats.iter().map(|s| s.book_title.as_str()).collect();
        assert_eq!(titles, vec!["1984", "Macbeth"]);

        assert_eq!(stats[0].total_flashcards, 1);
        assert_eq!(stats[0].average_accuracy, 0.0);
        assert_eq!(stats[0].completion_time_secs, None);

        assert_eq!(stats[1].total_flashcards, 2);
        assert!((stats[1].average_accuracy - 0.5).abs() < 1e-9);
        assert_eq!(stats[1].completion_time_secs, Some(3.0));
    }

    #[test]
    fn threshold_requires_all_three_conditions() {
        let user = UserId::random();
        let threshold = MasteryThreshold::default();
        assert!(threshold.is_mastered(&row(user, 1, 3, 3, 7)));
        assert!(!threshold.is_mastered(&row(user, 1, 2, 2, 30)));
        assert!(!threshold.is_mastered(&row(user, 1, 5, 3, 30)));
        assert!(!threshold.is_mastered(&row(user, 1, 5, 5, 6)));
        assert!(MasteryThreshold::new(1.5, 3, 7).is_err());
    }

    #[test]
    fn user_progress_counts_due_and_streak() {
        let user = UserId::random();
        let now = fixed_now();
        let progress = vec![row(user, 1, 3, 3, 7), row(user, 2, 2, 1, 0)];
        let attempts = vec![
            attempt(user, 1, true, now, None),
            attempt(user, 1, true, now - Duration::days(1), None),
            attempt(user, 2, false, now - Duration::days(2), None),
            attempt(user, 2, true, now - Duration::days(4), None),
        ];

        let summary = user_progress(&progress, &attempts, &MasteryThreshold::default(), now);
        assert_eq!(summary.cards_studied, 2);
        assert_eq!(summary.cards_mastered, 1);
        assert_eq!(summary.cards_due, 1);
        assert_eq!(summary.total_attempts, 5);
        assert_eq!(summary.correct_attempts, 4);
        assert!((summary.accuracy - 0.8).abs() < 1e-9);
        assert_eq!(summary.current_streak_days, 3);
    }

    #[test]
    fn streak_survives_until_today_is_answered() {
        let user = UserId::random();
        let now = fixed_now();
        let attempts = vec![attempt(user, 1, true, now - Duration::days(1), None)];
        let summary = user_progress(&[], &attempts, &MasteryThreshold::default(), now);
        assert_eq!(summary.current_streak_days, 1);
        assert_eq!(summary.accuracy, 0.0);
    }

    #[test]
    fn weekly_report_buckets_seven_days() {
        let user = UserId::random();
        let now = fixed_now();
        let attempts = vec![
            attempt(user, 1, true, now, None),
            attempt(user, 1, false, now, None),
            attempt(user, 2, true, now - Duration::days(6), None),
            attempt(user, 2, true, now - Duration::days(7), None),
        ];
        let progress = vec![row(user, 1, 3, 3, 7)];

        let report = weekly_report(&progress, &attempts, &MasteryThreshold::default(), now);
        assert_eq!(report.days.len(), 7);
        assert_eq!(report.days[6].day, now.date_naive());
        assert_eq!(report.days[6].attempts, 2);
        assert_eq!(report.days[6].correct, 1);
        assert_eq!(report.days[0].attempts, 1);
        assert_eq!(report.total_attempts, 3);
        assert_eq!(report.correct_attempts, 2);
        assert_eq!(report.cards_mastered, 1);
    }
}
