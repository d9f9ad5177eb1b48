use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hsc_core::analytics::{
    self, CardOrigin, MasteryThreshold, TextProgress, UserProgress, WeeklyReport,
};
use hsc_core::model::{Card, CardId, CardProgress, UserId};
use hsc_core::scheduler::Scheduler;
use storage::repository::{CardRepository, ProgressRepository, QuoteRepository};
use tracing::{debug, info};

use crate::Clock;
use crate::error::ProgressServiceError;
use crate::retry::read_with_retry;

/// Records attempts against the schedule and serves progress read models.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    scheduler: Scheduler,
    mastery: MasteryThreshold,
    quotes: Arc<dyn QuoteRepository>,
    cards: Arc<dyn CardRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quotes: Arc<dyn QuoteRepository>,
        cards: Arc<dyn CardRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            scheduler: Scheduler::default(),
            mastery: MasteryThreshold::default(),
            quotes,
            cards,
            progress,
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[must_use]
    pub fn with_mastery(mut self, mastery: MasteryThreshold) -> Self {
        self.mastery = mastery;
        self
    }

    #[must_use]
    pub fn mastery(&self) -> &MasteryThreshold {
        &self.mastery
    }

    /// Record an attempt stamped with the service clock.
    ///
    /// # Errors
    ///
    /// See [`ProgressService::record_attempt_at`].
    pub async fn record_attempt(
        &self,
        user_id: UserId,
        card_id: CardId,
        is_correct: bool,
        response_time_ms: Option<u64>,
    ) -> Result<CardProgress, ProgressServiceError> {
        self.record_attempt_at(user_id, card_id, is_correct, self.clock.now(), response_time_ms)
            .await
    }

    /// Apply one attempt to the user's ledger for `card_id` and persist the
    /// updated row together with the attempt record. Every call counts.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` (`NotFound` for an unknown
    /// card) or `ProgressServiceError::Scheduler` if the stored row is
    /// inconsistent.
    pub async fn record_attempt_at(
        &self,
        user_id: UserId,
        card_id: CardId,
        is_correct: bool,
        answered_at: DateTime<Utc>,
        response_time_ms: Option<u64>,
    ) -> Result<CardProgress, ProgressServiceError> {
        let previous =
            read_with_retry("get_progress", || self.progress.get_progress(user_id, card_id))
                .await?;
        let applied = self.scheduler.apply_attempt(
            user_id,
            card_id,
            previous.as_ref(),
            is_correct,
            answered_at,
            response_time_ms,
        )?;
        self.progress
            .record_attempt(&applied.progress, &applied.attempt)
            .await?;

        info!(
            %card_id,
            is_correct,
            attempts = applied.progress.attempts(),
            interval_days = applied.progress.interval_days(),
            "recorded attempt"
        );
        Ok(applied.progress)
    }

    /// Per-book statistics over every visible card.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn flashcard_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TextProgress>, ProgressServiceError> {
        let listings = read_with_retry("list_listings", || self.cards.list_listings()).await?;
        let books = read_with_retry("list_books", || self.quotes.list_books()).await?;
        let titles: HashMap<_, _> = books.into_iter().map(|b| (b.id, b.title)).collect();

        let origins: Vec<CardOrigin> = listings
            .into_iter()
            .filter(|listing| listing.card.is_visible())
            .map(|listing| CardOrigin {
                card_id: listing.card.id(),
                book_id: listing.book_id,
                book_title: titles.get(&listing.book_id).cloned().unwrap_or_default(),
            })
            .collect();

        let progress = read_with_retry("list_progress", || self.progress.list_progress(user_id))
            .await?;
        let attempts =
            read_with_retry("attempts_for_user", || self.progress.attempts_for_user(user_id, None))
                .await?;

        let stats = analytics::flashcard_progress(&origins, &progress, &attempts, &self.mastery);
        debug!(books = stats.len(), "computed flashcard progress");
        Ok(stats)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn user_progress(&self, user_id: UserId) -> Result<UserProgress, ProgressServiceError> {
        let progress = read_with_retry("list_progress", || self.progress.list_progress(user_id))
            .await?;
        let attempts =
            read_with_retry("attempts_for_user", || self.progress.attempts_for_user(user_id, None))
                .await?;
        Ok(analytics::user_progress(
            &progress,
            &attempts,
            &self.mastery,
            self.clock.now(),
        ))
    }

    /// The last seven UTC days, today included.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn weekly_report(&self, user_id: UserId) -> Result<WeeklyReport, ProgressServiceError> {
        let now = self.clock.now();
        let since = analytics::weekly_window_start(now);
        let progress = read_with_retry("list_progress", || self.progress.list_progress(user_id))
            .await?;
        let attempts = read_with_retry("attempts_for_user", || {
            self.progress.attempts_for_user(user_id, Some(since))
        })
        .await?;
        Ok(analytics::weekly_report(&progress, &attempts, &self.mastery, now))
    }

    /// Visible cards due for review, earliest first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn due_cards(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Card>, ProgressServiceError> {
        let now = self.clock.now();
        let due = read_with_retry("due_progress", || {
            self.progress.due_progress(user_id, now, limit)
        })
        .await?;
        let ids: Vec<CardId> = due.iter().map(CardProgress::card_id).collect();
        let cards = read_with_retry("get_cards", || self.cards.get_cards(&ids)).await?;
        Ok(cards.into_iter().filter(Card::is_visible).collect())
    }

    /// The per-card mastered badge. Unattempted cards are never mastered.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn is_mastered(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<bool, ProgressServiceError> {
        let row = read_with_retry("get_progress", || self.progress.get_progress(user_id, card_id))
            .await?;
        Ok(row.is_some_and(|p| self.mastery.is_mastered(&p)))
    }
}
