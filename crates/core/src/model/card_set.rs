use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CardId, CardSetId, UserId};

const MAX_SET_NAME_LEN: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardSetError {
    #[error("set name cannot be empty")]
    EmptyName,

    #[error("set name is {len} characters, max is {max}")]
    NameTooLong { len: usize, max: usize },
}

/// Validated set name (trimmed, non-empty, bounded).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetName(String);

impl SetName {
    /// # Errors
    ///
    /// Returns `CardSetError::EmptyName` or `CardSetError::NameTooLong`.
    pub fn new(value: impl Into<String>) -> Result<Self, CardSetError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CardSetError::EmptyName);
        }
        let len = trimmed.chars().count();
        if len > MAX_SET_NAME_LEN {
            return Err(CardSetError::NameTooLong {
                len,
                max: MAX_SET_NAME_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A student's personal, named collection of cards.
///
/// Membership lives in `CardSetItem` rows; the set itself never stores a
/// count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSet {
    id: CardSetId,
    owner: UserId,
    name: SetName,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CardSet {
    #[must_use]
    pub fn new(
        id: CardSetId,
        owner: UserId,
        name: SetName,
        description: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Self {
            id,
            owner,
            name,
            description,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> CardSetId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> UserId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &SetName {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Record a membership change.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Membership row of a card in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSetItem {
    pub set_id: CardSetId,
    pub card_id: CardId,
    pub added_at: DateTime<Utc>,
}

/// A set together with its member count, computed at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSetSummary {
    pub set: CardSet,
    pub card_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn name_validation() {
        assert_eq!(SetName::new(" Macbeth ").unwrap().as_str(), "Macbeth");
        assert_eq!(SetName::new("").unwrap_err(), CardSetError::EmptyName);
        let long = "x".repeat(101);
        assert!(matches!(
            SetName::new(long),
            Err(CardSetError::NameTooLong { len: 101, .. })
        ));
    }

    #[test]
    fn blank_description_is_dropped() {
        let owner = UserId::random();
        let set = CardSet::new(
            CardSetId::new(1),
            owner,
            SetName::new("Exam week").unwrap(),
            Some("   ".into()),
            fixed_now(),
            fixed_now(),
        );
        assert_eq!(set.description(), None);
        assert!(set.is_owned_by(owner));
        assert!(!set.is_owned_by(UserId::random()));
    }
}
