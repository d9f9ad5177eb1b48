use serde::{Deserialize, Serialize};

use crate::model::card::{Card, DifficultyLevel};
use crate::model::ids::{BookId, ThemeId};

/// A card joined with the quote fields the catalog filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardListing {
    pub card: Card,
    pub book_id: BookId,
    pub quote_title: String,
    pub quote_text: String,
}

/// Catalog query. Every `None`/empty dimension means "no constraint".
///
/// Dimensions combine with AND; `theme_ids` matches when the card carries
/// ANY of the listed themes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardFilter {
    pub search: Option<String>,
    pub book_id: Option<BookId>,
    pub theme_ids: Vec<ThemeId>,
    pub difficulty_level: Option<DifficultyLevel>,
    /// When false, cards hidden from students are included too.
    pub only_active: bool,
    pub include_archived: bool,
}

impl Default for CardFilter {
    fn default() -> Self {
        Self {
            search: None,
            book_id: None,
            theme_ids: Vec::new(),
            difficulty_level: None,
            only_active: true,
            include_archived: false,
        }
    }
}

impl CardFilter {
    #[must_use]
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    #[must_use]
    pub fn book(mut self, book_id: BookId) -> Self {
        self.book_id = Some(book_id);
        self
    }

    #[must_use]
    pub fn themes(mut self, theme_ids: impl IntoIterator<Item = ThemeId>) -> Self {
        self.theme_ids = theme_ids.into_iter().collect();
        self
    }

    #[must_use]
    pub fn difficulty(mut self, level: DifficultyLevel) -> Self {
        self.difficulty_level = Some(level);
        self
    }

    /// Admin view: include inactive and archived cards.
    #[must_use]
    pub fn everything(mut self) -> Self {
        self.only_active = false;
        self.include_archived = true;
        self
    }

    #[must_use]
    pub fn matches(&self, listing: &CardListing) -> bool {
        let card = &listing.card;

        if self.only_active && !card.is_active() {
            return false;
        }
        if !self.include_archived && card.is_archived() {
            return false;
        }
        if self.book_id.is_some_and(|book| book != listing.book_id) {
            return false;
        }
        if self
            .difficulty_level
            .is_some_and(|level| level != card.difficulty())
        {
            return false;
        }
        if !self.theme_ids.is_empty()
            && !self.theme_ids.iter().any(|t| card.theme_ids().contains(t))
        {
            return false;
        }
        match self.normalized_search() {
            Some(needle) => search_hits(listing, &needle),
            None => true,
        }
    }

    /// Apply the filter and order by creation time, then id.
    #[must_use]
    pub fn apply(&self, listings: Vec<CardListing>) -> Vec<Card> {
        let mut cards: Vec<Card> = listings
            .into_iter()
            .filter(|listing| self.matches(listing))
            .map(|listing| listing.card)
            .collect();
        cards.sort_by_key(|card| (card.created_at(), card.id()));
        cards
    }

    fn normalized_search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }
}

fn search_hits(listing: &CardListing, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    contains(listing.card.card_text())
        || listing.card.missing_words().iter().any(|w| contains(w))
        || contains(&listing.quote_text)
        || contains(&listing.quote_title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::card::CardDraft;
    use crate::model::ids::{CardId, QuoteId};
    use crate::time::fixed_now;
    use std::collections::BTreeSet;

    fn listing(id: u64, book: u64, themes: &[u64], difficulty: u8) -> CardListing {
        let draft = CardDraft {
            quote_id: QuoteId::new(id),
            card_text: "Who controls the past controls the _____".into(),
            missing_words: vec!["future".into()],
            missing_positions: vec![6],
            difficulty: DifficultyLevel::new(difficulty).unwrap(),
            theme_ids: themes.iter().copied().map(ThemeId::new).collect::<BTreeSet<_>>(),
        };
        CardListing {
            card: draft
                .assign_id(CardId::new(id), fixed_now() + chrono::Duration::seconds(id as i64))
                .unwrap(),
            book_id: BookId::new(book),
            quote_title: format!("Quote {id}"),
            quote_text: "Who controls the past controls the future".into(),
        }
    }

    fn ids(cards: &[Card]) -> Vec<u64> {
        cards.iter().map(|c| c.id().value()).collect()
    }

    #[test]
    fn empty_filter_returns_visible_cards_in_creation_order() {
        let mut hidden = listing(3, 1, &[], 1);
        hidden.card.set_active(false, fixed_now());
        let cards = CardFilter::default().apply(vec![listing(2, 1, &[], 1), hidden, listing(1, 1, &[], 1)]);
        assert_eq!(ids(&cards), vec![1, 2]);
    }

    #[test]
    fn themes_are_ored_and_dimensions_anded() {
        let corpus = vec![
            listing(1, 1, &[10], 1),
            listing(2, 1, &[11], 1),
            listing(3, 1, &[12], 1),
            listing(4, 2, &[10], 1),
            listing(5, 1, &[10, 12], 2),
        ];
        let filter = CardFilter::default()
            .book(BookId::new(1))
            .themes([ThemeId::new(10), ThemeId::new(11)]);
        assert_eq!(ids(&filter.apply(corpus.clone())), vec![1, 2, 5]);

        let filter = filter.difficulty(DifficultyLevel::new(2).unwrap());
        assert_eq!(ids(&filter.apply(corpus)), vec![5]);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let mut titled = listing(2, 1, &[], 1);
        titled.quote_title = "Doublethink".into();
        let corpus = vec![listing(1, 1, &[], 1), titled];

        assert_eq!(ids(&CardFilter::default().search("FUTURE").apply(corpus.clone())), vec![1, 2]);
        assert_eq!(ids(&CardFilter::default().search("doublethink").apply(corpus.clone())), vec![2]);
        assert_eq!(ids(&CardFilter::default().search("   ").apply(corpus.clone())), vec![1, 2]);
        assert!(CardFilter::default().search("Winston").apply(corpus).is_empty());
    }

    #[test]
    fn archive_and_active_are_separate_facets() {
        let mut archived = listing(1, 1, &[], 1);
        archived.card.set_archived(true, fixed_now());
        let mut inactive = listing(2, 1, &[], 1);
        inactive.card.set_active(false, fixed_now());
        let corpus = vec![archived, inactive, listing(3, 1, &[], 1)];

        let mut filter = CardFilter::default();
        assert_eq!(ids(&filter.apply(corpus.clone())), vec![3]);

        filter.only_active = false;
        assert_eq!(ids(&filter.apply(corpus.clone())), vec![2, 3]);

        filter.include_archived = true;
        assert_eq!(ids(&filter.apply(corpus.clone())), vec![1, 2, 3]);

        assert_eq!(ids(&CardFilter::default().everything().apply(corpus)), vec![1, 2, 3]);
    }
}
