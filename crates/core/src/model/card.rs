use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, QuoteId, ThemeId};

/// Marker that replaces each redacted word in `card_text`.
pub const BLANK_MARKER: &str = "_____";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card text cannot be empty")]
    EmptyText,

    #[error("a card needs at least one blank")]
    NoBlanks,

    #[error("{words} missing words but {positions} positions")]
    BlankCountMismatch { words: usize, positions: usize },

    #[error("missing word #{index} is empty")]
    EmptyMissingWord { index: usize },

    #[error("blank positions must be strictly increasing")]
    PositionsNotIncreasing,

    #[error("position {position} does not hold a blank in the card text")]
    UnresolvablePosition { position: usize },

    #[error("card text has {markers} blanks but {positions} positions")]
    StrayBlank { markers: usize, positions: usize },

    #[error("difficulty must be between 1 and 5, got {0}")]
    InvalidDifficulty(u8),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Author-assigned difficulty, 1 (easiest) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DifficultyLevel(u8);

impl DifficultyLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// # Errors
    ///
    /// Returns `CardError::InvalidDifficulty` outside `1..=5`.
    pub fn new(value: u8) -> Result<Self, CardError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CardError::InvalidDifficulty(value))
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u8> for DifficultyLevel {
    type Error = CardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DifficultyLevel> for u8 {
    fn from(value: DifficultyLevel) -> Self {
        value.0
    }
}

//
// ─── CARD TYPES ────────────────────────────────────────────────────────────────
//

/// A generated card that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDraft {
    pub quote_id: QuoteId,
    pub card_text: String,
    pub missing_words: Vec<String>,
    /// Whitespace-token index of each blank, parallel to `missing_words`.
    pub missing_positions: Vec<usize>,
    pub difficulty: DifficultyLevel,
    /// Seeded from the quote's themes at generation time.
    pub theme_ids: BTreeSet<ThemeId>,
}

impl CardDraft {
    /// Check the blank invariants.
    ///
    /// # Errors
    ///
    /// Returns the first `CardError` found.
    pub fn validate(&self) -> Result<(), CardError> {
        check_blanks(&self.card_text, &self.missing_words, &self.missing_positions)
    }

    /// Turn a validated draft into a fresh, visible card.
    ///
    /// # Errors
    ///
    /// Returns `CardError` when the draft breaks a blank invariant.
    pub fn assign_id(self, id: CardId, created_at: DateTime<Utc>) -> Result<Card, CardError> {
        Card::from_persisted(id, self, true, false, created_at, created_at)
    }
}

/// A fill-in-the-blank flashcard derived from one quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: CardId,
    quote_id: QuoteId,
    card_text: String,
    missing_words: Vec<String>,
    missing_positions: Vec<usize>,
    difficulty: DifficultyLevel,
    theme_ids: BTreeSet<ThemeId>,
    is_active: bool,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Card {
    /// Rehydrate a card from storage, re-checking its blank invariants.
    ///
    /// # Errors
    ///
    /// Returns `CardError` if the stored blanks cannot be resolved.
    pub fn from_persisted(
        id: CardId,
        draft: CardDraft,
        is_active: bool,
        is_archived: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CardError> {
        draft.validate()?;
        Ok(Self {
            id,
            quote_id: draft.quote_id,
            card_text: draft.card_text,
            missing_words: draft.missing_words,
            missing_positions: draft.missing_positions,
            difficulty: draft.difficulty,
            theme_ids: draft.theme_ids,
            is_active,
            is_archived,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn quote_id(&self) -> QuoteId {
        self.quote_id
    }

    #[must_use]
    pub fn card_text(&self) -> &str {
        &self.card_text
    }

    #[must_use]
    pub fn missing_words(&self) -> &[String] {
        &self.missing_words
    }

    #[must_use]
    pub fn missing_positions(&self) -> &[usize] {
        &self.missing_positions
    }

    #[must_use]
    pub fn difficulty(&self) -> DifficultyLevel {
        self.difficulty
    }

    #[must_use]
    pub fn theme_ids(&self) -> &BTreeSet<ThemeId> {
        &self.theme_ids
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Shown to students in default views: active and not archived.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.is_active && !self.is_archived
    }

    /// What the student has to type: the missing words in quote order.
    #[must_use]
    pub fn expected_answer(&self) -> String {
        self.missing_words.join(" ")
    }

    /// Quote text with every blank filled back in.
    ///
    /// Whitespace is normalized to single spaces.
    #[must_use]
    pub fn reconstruct(&self) -> String {
        let mut tokens: Vec<String> = self
            .card_text
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        for (word, &position) in self.missing_words.iter().zip(&self.missing_positions) {
            if let Some(token) = tokens.get_mut(position) {
                *token = token.replacen(BLANK_MARKER, word, 1);
            }
        }
        tokens.join(" ")
    }

    pub fn set_active(&mut self, is_active: bool, now: DateTime<Utc>) {
        if self.is_active != is_active {
            self.is_active = is_active;
            self.updated_at = now;
        }
    }

    pub fn set_archived(&mut self, is_archived: bool, now: DateTime<Utc>) {
        if self.is_archived != is_archived {
            self.is_archived = is_archived;
            self.updated_at = now;
        }
    }

    /// Replace (never merge) the card's theme set.
    pub fn replace_themes(&mut self, theme_ids: BTreeSet<ThemeId>, now: DateTime<Utc>) {
        self.theme_ids = theme_ids;
        self.updated_at = now;
    }
}

fn check_blanks(card_text: &str, words: &[String], positions: &[usize]) -> Result<(), CardError> {
    if card_text.trim().is_empty() {
        return Err(CardError::EmptyText);
    }
    if words.len() != positions.len() {
        return Err(CardError::BlankCountMismatch {
            words: words.len(),
            positions: positions.len(),
        });
    }
    if words.is_empty() {
        return Err(CardError::NoBlanks);
    }
    if let Some(index) = words.iter().position(|w| w.trim().is_empty()) {
        return Err(CardError::EmptyMissingWord { index });
    }
    if positions.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(CardError::PositionsNotIncreasing);
    }

    let tokens: Vec<&str> = card_text.split_whitespace().collect();
    for &position in positions {
        let holds_blank = tokens
            .get(position)
            .is_some_and(|token| token.contains(BLANK_MARKER));
        if !holds_blank {
            return Err(CardError::UnresolvablePosition { position });
        }
    }

    let markers = tokens.iter().filter(|t| t.contains(BLANK_MARKER)).count();
    if markers != positions.len() {
        return Err(CardError::StrayBlank {
            markers,
            positions: positions.len(),
        });
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
