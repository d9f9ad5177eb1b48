//! Study session state machine.
//!
//! A session is a plain value: the card list, a cursor and what happened to
//! each card so far. Every transition reports how the navigation history
//! should record it, and the whole value serializes into a history entry.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching;
use crate::model::{Card, CardId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StudyError {
    #[error("a study session needs at least one card")]
    EmptySession,

    #[error("answer is empty")]
    EmptyAnswer,

    #[error("card {index} was already answered")]
    AlreadyAnswered { index: usize },

    #[error("an answer check is already in flight")]
    CheckInFlight,

    #[error("no answer check is in flight")]
    NoCheckInFlight,

    #[error("the current card has not been answered yet")]
    NotAnswered,

    #[error("already at the first card")]
    AtFirstCard,

    #[error("session is complete")]
    Complete,

    #[error("session has ended")]
    Ended,

    #[error("cursor {cursor} is outside a session of {len} cards")]
    CursorOutOfRange { cursor: usize, len: usize },
}

/// Where the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyPhase {
    /// Current card awaits an answer.
    Presenting,
    /// Current card shows its recorded result.
    Answered,
    Complete,
    Ended,
}

/// How a transition should land in the navigation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    /// New entry; back returns to the previous state.
    Push,
    /// Overwrite the current entry.
    Replace,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u32,
    pub answered: u32,
    pub total: u32,
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.correct, self.total)
    }
}

/// Per-card state within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSlot {
    pub card: Card,
    pub input: String,
    pub result: Option<bool>,
    pub presented_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl CardSlot {
    fn new(card: Card) -> Self {
        Self {
            card,
            input: String::new(),
            result: None,
            presented_at: None,
            answered_at: None,
        }
    }
}

/// An answer judged locally, waiting for the attempt to be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCheck {
    pub card_id: CardId,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
}

/// Outcome of `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize },
    Complete(Tally),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SessionSnapshot")]
pub struct StudySession {
    slots: Vec<CardSlot>,
    cursor: usize,
    phase: StudyPhase,
    /// Never part of a snapshot: a restored session has nothing in flight.
    #[serde(skip)]
    in_flight: bool,
}

/// Wire shape of a snapshot, checked before it becomes a session.
#[derive(Deserialize)]
struct SessionSnapshot {
    slots: Vec<CardSlot>,
    cursor: usize,
    phase: StudyPhase,
}

impl TryFrom<SessionSnapshot> for StudySession {
    type Error = StudyError;

    fn try_from(snapshot: SessionSnapshot) -> Result<Self, Self::Error> {
        if snapshot.slots.is_empty() {
            return Err(StudyError::EmptySession);
        }
        if snapshot.cursor >= snapshot.slots.len() {
            return Err(StudyError::CursorOutOfRange {
                cursor: snapshot.cursor,
                len: snapshot.slots.len(),
            });
        }
        Ok(Self {
            slots: snapshot.slots,
            cursor: snapshot.cursor,
            phase: snapshot.phase,
            in_flight: false,
        })
    }
}

impl StudySession {
    /// Start on the first card. Duplicate cards keep their first position.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::EmptySession` for an empty card list.
    pub fn start(cards: Vec<Card>, now: DateTime<Utc>) -> Result<Self, StudyError> {
        let mut seen = HashSet::with_capacity(cards.len());
        let mut slots: Vec<CardSlot> = cards
            .into_iter()
            .filter(|card| seen.insert(card.id()))
            .map(CardSlot::new)
            .collect();
        let Some(first) = slots.first_mut() else {
            return Err(StudyError::EmptySession);
        };
        first.presented_at = Some(now);
        Ok(Self {
            slots,
            cursor: 0,
            phase: StudyPhase::Presenting,
            in_flight: false,
        })
    }

    #[must_use]
    pub fn phase(&self) -> StudyPhase {
        self.phase
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn is_check_in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn current(&self) -> &CardSlot {
        &self.slots[self.cursor]
    }

    #[must_use]
    pub fn slots(&self) -> &[CardSlot] {
        &self.slots
    }

    #[must_use]
    pub fn card_ids(&self) -> Vec<CardId> {
        self.slots.iter().map(|slot| slot.card.id()).collect()
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally {
            correct: 0,
            answered: 0,
            total: u32::try_from(self.slots.len()).unwrap_or(u32::MAX),
        };
        for result in self.slots.iter().filter_map(|slot| slot.result) {
            tally.answered = tally.answered.saturating_add(1);
            if result {
                tally.correct = tally.correct.saturating_add(1);
            }
        }
        tally
    }

    fn ensure_live(&self) -> Result<(), StudyError> {
        match self.phase {
            StudyPhase::Ended => Err(StudyError::Ended),
            StudyPhase::Complete => Err(StudyError::Complete),
            StudyPhase::Presenting | StudyPhase::Answered => Ok(()),
        }
    }

    fn ensure_presenting(&self) -> Result<(), StudyError> {
        self.ensure_live()?;
        if self.in_flight {
            return Err(StudyError::CheckInFlight);
        }
        if self.phase == StudyPhase::Answered {
            return Err(StudyError::AlreadyAnswered { index: self.cursor });
        }
        Ok(())
    }

    /// Edit the answer being typed for the current card.
    ///
    /// # Errors
    ///
    /// Rejected once the card is answered or while a check is in flight.
    pub fn set_input(&mut self, input: impl Into<String>) -> Result<HistoryAction, StudyError> {
        self.ensure_presenting()?;
        self.slots[self.cursor].input = input.into();
        Ok(HistoryAction::Replace)
    }

    /// Judge the current input and mark the check as in flight.
    ///
    /// The caller records the attempt, then calls [`confirm_check`] on success
    /// or [`abort_check`] on failure.
    ///
    /// [`confirm_check`]: Self::confirm_check
    /// [`abort_check`]: Self::abort_check
    ///
    /// # Errors
    ///
    /// - `EmptyAnswer` when the input is blank.
    /// - `AlreadyAnswered` on a second check of the same card.
    /// - `CheckInFlight` while a previous check is pending.
    pub fn begin_check(&mut self, now: DateTime<Utc>) -> Result<PendingCheck, StudyError> {
        self.ensure_presenting()?;
        let slot = &self.slots[self.cursor];
        if slot.input.trim().is_empty() {
            return Err(StudyError::EmptyAnswer);
        }
        let response_time_ms = slot
            .presented_at
            .and_then(|shown| u64::try_from((now - shown).num_milliseconds()).ok());
        let pending = PendingCheck {
            card_id: slot.card.id(),
            is_correct: matching::is_correct(&slot.card, &slot.input),
            answered_at: now,
            response_time_ms,
        };
        self.in_flight = true;
        Ok(pending)
    }

    /// The attempt was recorded: reveal the result.
    ///
    /// # Errors
    ///
    /// `NoCheckInFlight` without a matching `begin_check`; `Ended` if the
    /// session was ended meanwhile.
    pub fn confirm_check(&mut self, pending: &PendingCheck) -> Result<HistoryAction, StudyError> {
        if !self.in_flight {
            return Err(StudyError::NoCheckInFlight);
        }
        self.in_flight = false;
        self.ensure_live()?;
        let slot = &mut self.slots[self.cursor];
        slot.result = Some(pending.is_correct);
        slot.answered_at = Some(pending.answered_at);
        self.phase = StudyPhase::Answered;
        Ok(HistoryAction::Push)
    }

    /// The attempt could not be recorded: stay on the card with the input intact.
    pub fn abort_check(&mut self) {
        self.in_flight = false;
    }

    /// Move to the next card, or complete the session after the last one.
    ///
    /// # Errors
    ///
    /// `NotAnswered` unless the current card shows its result.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<(Advance, HistoryAction), StudyError> {
        self.ensure_live()?;
        if self.in_flight {
            return Err(StudyError::CheckInFlight);
        }
        if self.phase != StudyPhase::Answered {
            return Err(StudyError::NotAnswered);
        }
        if self.cursor + 1 >= self.slots.len() {
            self.phase = StudyPhase::Complete;
            return Ok((Advance::Complete(self.tally()), HistoryAction::Push));
        }
        self.cursor += 1;
        self.show_current(now);
        Ok((Advance::Moved { index: self.cursor }, HistoryAction::Push))
    }

    /// Step back to the previous card, which shows its recorded result.
    /// From a completed session the last card is shown again in place.
    ///
    /// # Errors
    ///
    /// `AtFirstCard` at index 0, `CheckInFlight` while a check is pending.
    pub fn previous(&mut self, now: DateTime<Utc>) -> Result<HistoryAction, StudyError> {
        if self.phase == StudyPhase::Ended {
            return Err(StudyError::Ended);
        }
        if self.in_flight {
            return Err(StudyError::CheckInFlight);
        }
        if self.phase == StudyPhase::Complete {
            self.show_current(now);
            return Ok(HistoryAction::Push);
        }
        if self.cursor == 0 {
            return Err(StudyError::AtFirstCard);
        }
        self.cursor -= 1;
        self.show_current(now);
        Ok(HistoryAction::Push)
    }

    /// Discard the session. Legal from any state.
    pub fn end(&mut self) -> Tally {
        self.phase = StudyPhase::Ended;
        self.tally()
    }

    /// Copy results recorded in `newer` into this (older) snapshot.
    ///
    /// Restoring a history entry must not reopen a card that was already
    /// answered. Returns false when the two sessions hold different cards.
    pub fn carry_answers(&mut self, newer: &StudySession) -> bool {
        if self.card_ids() != newer.card_ids() {
            return false;
        }
        for (slot, recorded) in self.slots.iter_mut().zip(&newer.slots) {
            if slot.result.is_none() && recorded.result.is_some() {
                slot.input.clone_from(&recorded.input);
                slot.result = recorded.result;
                slot.answered_at = recorded.answered_at;
            }
        }
        if self.phase == StudyPhase::Presenting && self.slots[self.cursor].result.is_some() {
            self.phase = StudyPhase::Answered;
        }
        true
    }

    fn show_current(&mut self, now: DateTime<Utc>) {
        let slot = &mut self.slots[self.cursor];
        if slot.result.is_some() {
            self.phase = StudyPhase::Answered;
        } else {
            slot.presented_at = Some(now);
            self.phase = StudyPhase::Presenting;
        }
    }
}
