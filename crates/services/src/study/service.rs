use std::sync::Arc;

use hsc_core::model::{Card, CardFilter, CardProgress, CardSetId, UserId};
use hsc_core::study::{Advance, HistoryAction, StudySession, Tally};
use tracing::{info, warn};

use crate::Clock;
use crate::catalog_service::CatalogService;
use crate::error::StudyServiceError;
use crate::progress_service::ProgressService;
use crate::set_service::SetService;

/// Outcome of a successful answer check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub is_correct: bool,
    pub expected: String,
    pub progress: CardProgress,
    pub action: HistoryAction,
}

/// Starts study sessions and persists their answers.
#[derive(Clone)]
pub struct StudyService {
    clock: Clock,
    catalog: Arc<CatalogService>,
    sets: Arc<SetService>,
    progress: Arc<ProgressService>,
}

impl StudyService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<CatalogService>,
        sets: Arc<SetService>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            clock,
            catalog,
            sets,
            progress,
        }
    }

    fn start(&self, cards: Vec<Card>, source: &'static str) -> Result<StudySession, StudyServiceError> {
        let session = StudySession::start(cards, self.clock.now())?;
        info!(source, cards = session.len(), "started study session");
        Ok(session)
    }

    /// Session over the catalog cards matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::EmptySession` when nothing matches, or a storage error.
    pub async fn start_from_filter(
        &self,
        filter: &CardFilter,
    ) -> Result<StudySession, StudyServiceError> {
        let cards = self.catalog.list_cards(filter).await?;
        self.start(cards, "filter")
    }

    /// Session over the visible members of one of the user's sets.
    ///
    /// # Errors
    ///
    /// Returns `SetServiceError::NotOwner` for someone else's set,
    /// `StudyError::EmptySession`, or a storage error.
    pub async fn start_from_set(
        &self,
        user: UserId,
        set_id: CardSetId,
    ) -> Result<StudySession, StudyServiceError> {
        self.sets.get_owned_set(user, set_id).await?;
        let cards = self.sets.list_cards_in_set(set_id).await?;
        self.start(cards.into_iter().filter(Card::is_visible).collect(), "set")
    }

    /// Session over the user's due cards, earliest first.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::EmptySession` when nothing is due, or a storage error.
    pub async fn start_due(&self, user: UserId, limit: u32) -> Result<StudySession, StudyServiceError> {
        let cards = self.progress.due_cards(user, limit).await?;
        self.start(cards, "due")
    }

    /// Check the typed answer on the current card and record the attempt.
    ///
    /// The card only turns `Answered` after the write succeeds. On a failed
    /// write the session stays on the card with the input kept, and a
    /// second check on an answered card is rejected before any write.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` for an illegal check (empty input, already
    /// answered, in flight, session over) or the progress write failure.
    pub async fn check_answer(
        &self,
        user: UserId,
        session: &mut StudySession,
    ) -> Result<CheckOutcome, StudyServiceError> {
        let pending = session.begin_check(self.clock.now())?;
        let recorded = self
            .progress
            .record_attempt_at(
                user,
                pending.card_id,
                pending.is_correct,
                pending.answered_at,
                pending.response_time_ms,
            )
            .await;

        let progress = match recorded {
            Ok(progress) => progress,
            Err(err) => {
                session.abort_check();
                warn!(card_id = %pending.card_id, error = %err, "attempt not recorded");
                return Err(err.into());
            }
        };

        let action = session.confirm_check(&pending)?;
        Ok(CheckOutcome {
            is_correct: pending.is_correct,
            expected: session.current().card.expected_answer(),
            progress,
            action,
        })
    }

    /// # Errors
    ///
    /// Returns `StudyError` if the current card is unanswered or the session is over.
    pub fn next(
        &self,
        session: &mut StudySession,
    ) -> Result<(Advance, HistoryAction), StudyServiceError> {
        let step = session.next(self.clock.now())?;
        if let (Advance::Complete(tally), _) = step {
            info!(%tally, "study session complete");
        }
        Ok(step)
    }

    /// # Errors
    ///
    /// Returns `StudyError` at the first card, while a check is in flight,
    /// or after the session ended.
    pub fn previous(&self, session: &mut StudySession) -> Result<HistoryAction, StudyServiceError> {
        Ok(session.previous(self.clock.now())?)
    }

    /// Discard the session. An in-flight write is left to finish.
    pub fn end_session(&self, session: &mut StudySession) -> Tally {
        let tally = session.end();
        info!(%tally, "study session ended");
        tally
    }
}
