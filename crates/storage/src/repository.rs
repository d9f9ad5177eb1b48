use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hsc_core::model::{
    AttemptRecord, Book, BookId, Card, CardDraft, CardFilter, CardId, CardListing, CardProgress,
    CardSet, CardSetId, CardSetItem, CardSetSummary, Quote, QuoteId, SetName, Theme, ThemeColor,
    ThemeId, ThemeName, UserId,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Quote fields supplied by the content author; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewQuoteRecord {
    pub book_id: BookId,
    pub title: String,
    pub text: String,
    pub source: Option<String>,
    pub is_active: bool,
    pub theme_ids: BTreeSet<ThemeId>,
}

impl NewQuoteRecord {
    #[must_use]
    pub fn new(book_id: BookId, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            book_id,
            title: title.into(),
            text: text.into(),
            source: None,
            is_active: true,
            theme_ids: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_themes(mut self, theme_ids: impl IntoIterator<Item = ThemeId>) -> Self {
        self.theme_ids = theme_ids.into_iter().collect();
        self
    }
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Books, quotes and quote/theme associations.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the book cannot be stored.
    async fn insert_book(&self, title: &str, author: Option<&str>) -> Result<Book, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_book(&self, id: BookId) -> Result<Book, StorageError>;

    /// Books ordered by title.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_books(&self) -> Result<Vec<Book>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the book or a theme is unknown.
    async fn insert_quote(&self, quote: NewQuoteRecord) -> Result<Quote, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_quote(&self, id: QuoteId) -> Result<Quote, StorageError>;

    /// Quotes of a book in id order, active or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_quotes_by_book(&self, book_id: BookId) -> Result<Vec<Quote>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quote is unknown.
    async fn quote_themes(&self, id: QuoteId) -> Result<BTreeSet<ThemeId>, StorageError>;
}

#[async_trait]
pub trait ThemeRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the name is taken.
    async fn insert_theme(
        &self,
        name: &ThemeName,
        color: &ThemeColor,
    ) -> Result<Theme, StorageError>;

    /// Themes ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_themes(&self) -> Result<Vec<Theme>, StorageError>;

    /// Delete a theme and detach it from every quote and card.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn delete_theme(&self, id: ThemeId) -> Result<(), StorageError>;
}

/// Card catalog. Every multi-card mutation is all-or-nothing: one unknown id
/// fails the whole call with `NotFound` and nothing is written.
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the quote or a theme is unknown.
    async fn insert_card(
        &self,
        draft: CardDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Card, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_card(&self, id: CardId) -> Result<Card, StorageError>;

    /// Cards in the order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is unknown.
    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn cards_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Card>, StorageError>;

    /// Every card joined with its quote, unfiltered.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_listings(&self) -> Result<Vec<CardListing>, StorageError>;

    /// Cards matching `filter`, ordered by creation time then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is unknown.
    async fn set_active(
        &self,
        ids: &[CardId],
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is unknown.
    async fn set_archived(
        &self,
        ids: &[CardId],
        is_archived: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Replace each card's theme set with exactly `theme_ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if a card or theme is unknown.
    async fn replace_themes(
        &self,
        ids: &[CardId],
        theme_ids: &BTreeSet<ThemeId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Hard delete, cascading to set membership, progress and attempts.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any id is unknown.
    async fn delete_cards(&self, ids: &[CardId]) -> Result<(), StorageError>;

    /// Delete `old` (with cascades) and insert `drafts` in one step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any old id is unknown.
    async fn replace_cards(
        &self,
        old: &[CardId],
        drafts: Vec<CardDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>, StorageError>;
}

#[async_trait]
pub trait CardSetRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the set cannot be stored.
    async fn create_set(
        &self,
        owner: UserId,
        name: &SetName,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CardSet, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_set(&self, id: CardSetId) -> Result<CardSet, StorageError>;

    /// Sets of `owner` with member counts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_sets(&self, owner: UserId) -> Result<Vec<CardSetSummary>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn delete_set(&self, id: CardSetId) -> Result<(), StorageError>;

    /// Add a member. Re-adding keeps the original `added_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the set or card is unknown.
    async fn add_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<CardSetItem, StorageError>;

    /// Remove a member; absent members are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the set is unknown.
    async fn remove_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Members ordered by `added_at`, then card id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the set is unknown.
    async fn list_cards_in_set(&self, set_id: CardSetId) -> Result<Vec<Card>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the set is unknown.
    async fn count_cards(&self, set_id: CardSetId) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_progress(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CardProgress>, StorageError>;

    /// Rows with `next_review_at <= now` on visible cards, earliest first.
    /// `limit` counts only those rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn due_progress(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CardProgress>, StorageError>;

    /// Upsert the ledger row and append the attempt atomically.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the card is unknown.
    /// - `Conflict` if the row and the attempt disagree on user or card.
    async fn record_attempt(
        &self,
        progress: &CardProgress,
        attempt: &AttemptRecord,
    ) -> Result<(), StorageError>;

    /// Attempts of a user, oldest first, optionally from `since` on.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn attempts_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AttemptRecord>, StorageError>;
}

//
// ─── IN MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    books: HashMap<BookId, Book>,
    quotes: HashMap<QuoteId, Quote>,
    quote_themes: HashMap<QuoteId, BTreeSet<ThemeId>>,
    themes: HashMap<ThemeId, Theme>,
    cards: HashMap<CardId, Card>,
    sets: HashMap<CardSetId, CardSet>,
    set_items: HashMap<CardSetId, Vec<CardSetItem>>,
    progress: HashMap<(UserId, CardId), CardProgress>,
    attempts: Vec<AttemptRecord>,
}

impl MemoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_cards(&self, ids: &[CardId]) -> Result<(), StorageError> {
        if ids.iter().all(|id| self.cards.contains_key(id)) {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    fn require_themes<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ThemeId>,
    ) -> Result<(), StorageError> {
        if ids.into_iter().all(|id| self.themes.contains_key(id)) {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    fn insert_card(&mut self, draft: CardDraft, now: DateTime<Utc>) -> Result<Card, StorageError> {
        if !self.quotes.contains_key(&draft.quote_id) {
            return Err(StorageError::NotFound);
        }
        self.require_themes(&draft.theme_ids)?;
        let id = CardId::new(self.allocate());
        let card = draft
            .assign_id(id, now)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.cards.insert(id, card.clone());
        Ok(card)
    }

    fn delete_cards(&mut self, ids: &[CardId]) {
        let doomed: HashSet<CardId> = ids.iter().copied().collect();
        self.cards.retain(|id, _| !doomed.contains(id));
        for items in self.set_items.values_mut() {
            items.retain(|item| !doomed.contains(&item.card_id));
        }
        self.progress.retain(|(_, card), _| !doomed.contains(card));
        self.attempts.retain(|a| !doomed.contains(&a.card_id));
    }

    fn listing(&self, card: &Card) -> Option<CardListing> {
        let quote = self.quotes.get(&card.quote_id())?;
        Some(CardListing {
            card: card.clone(),
            book_id: quote.book_id,
            quote_title: quote.title.clone(),
            quote_text: quote.text.clone(),
        })
    }

    fn set_members(&self, set_id: CardSetId) -> Result<&[CardSetItem], StorageError> {
        if !self.sets.contains_key(&set_id) {
            return Err(StorageError::NotFound);
        }
        Ok(self.set_items.get(&set_id).map_or(&[], Vec::as_slice))
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All tables sit behind one lock, so multi-row operations are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl QuoteRepository for InMemoryRepository {
    async fn insert_book(&self, title: &str, author: Option<&str>) -> Result<Book, StorageError> {
        let mut guard = self.lock()?;
        let book = Book::new(
            BookId::new(guard.allocate()),
            title,
            author.map(str::to_owned),
        );
        guard.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: BookId) -> Result<Book, StorageError> {
        let guard = self.lock()?;
        guard.books.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let guard = self.lock()?;
        let mut books: Vec<Book> = guard.books.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn insert_quote(&self, record: NewQuoteRecord) -> Result<Quote, StorageError> {
        let mut guard = self.lock()?;
        if !guard.books.contains_key(&record.book_id) {
            return Err(StorageError::NotFound);
        }
        guard.require_themes(&record.theme_ids)?;
        let mut quote = Quote::new(
            QuoteId::new(guard.allocate()),
            record.book_id,
            record.title,
            record.text,
        );
        quote.source = record.source;
        quote.is_active = record.is_active;
        guard.quote_themes.insert(quote.id, record.theme_ids);
        guard.quotes.insert(quote.id, quote.clone());
        Ok(quote)
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Quote, StorageError> {
        let guard = self.lock()?;
        guard.quotes.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_quotes_by_book(&self, book_id: BookId) -> Result<Vec<Quote>, StorageError> {
        let guard = self.lock()?;
        let mut quotes: Vec<Quote> = guard
            .quotes
            .values()
            .filter(|q| q.book_id == book_id)
            .cloned()
            .collect();
        quotes.sort_by_key(|q| q.id);
        Ok(quotes)
    }

    async fn quote_themes(&self, id: QuoteId) -> Result<BTreeSet<ThemeId>, StorageError> {
        let guard = self.lock()?;
        if !guard.quotes.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        Ok(guard.quote_themes.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ThemeRepository for InMemoryRepository {
    async fn insert_theme(
        &self,
        name: &ThemeName,
        color: &ThemeColor,
    ) -> Result<Theme, StorageError> {
        let mut guard = self.lock()?;
        if guard.themes.values().any(|t| t.name() == name) {
            return Err(StorageError::Conflict);
        }
        let theme = Theme::new(ThemeId::new(guard.allocate()), name.clone(), color.clone());
        guard.themes.insert(theme.id(), theme.clone());
        Ok(theme)
    }

    async fn list_themes(&self) -> Result<Vec<Theme>, StorageError> {
        let guard = self.lock()?;
        let mut themes: Vec<Theme> = guard.themes.values().cloned().collect();
        themes.sort_by(|a, b| a.name().as_str().cmp(b.name().as_str()));
        Ok(themes)
    }

    async fn delete_theme(&self, id: ThemeId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.themes.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        for themes in guard.quote_themes.values_mut() {
            themes.remove(&id);
        }
        for card in guard.cards.values_mut() {
            if card.theme_ids().contains(&id) {
                let mut kept = card.theme_ids().clone();
                kept.remove(&id);
                let stamp = card.updated_at();
                card.replace_themes(kept, stamp);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CardRepository for InMemoryRepository {
    async fn insert_card(
        &self,
        draft: CardDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Card, StorageError> {
        self.lock()?.insert_card(draft, created_at)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let guard = self.lock()?;
        guard.cards.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, StorageError> {
        let guard = self.lock()?;
        ids.iter()
            .map(|id| guard.cards.get(id).cloned().ok_or(StorageError::NotFound))
            .collect()
    }

    async fn cards_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Card>, StorageError> {
        let guard = self.lock()?;
        let mut cards: Vec<Card> = guard
            .cards
            .values()
            .filter(|c| c.quote_id() == quote_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| (c.created_at(), c.id()));
        Ok(cards)
    }

    async fn list_listings(&self) -> Result<Vec<CardListing>, StorageError> {
        let guard = self.lock()?;
        let mut listings: Vec<CardListing> = guard
            .cards
            .values()
            .filter_map(|card| guard.listing(card))
            .collect();
        listings.sort_by_key(|l| (l.card.created_at(), l.card.id()));
        Ok(listings)
    }

    async fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>, StorageError> {
        let listings = self.list_listings().await?;
        Ok(filter.apply(listings))
    }

    async fn set_active(
        &self,
        ids: &[CardId],
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.require_cards(ids)?;
        for id in ids {
            if let Some(card) = guard.cards.get_mut(id) {
                card.set_active(is_active, now);
            }
        }
        Ok(())
    }

    async fn set_archived(
        &self,
        ids: &[CardId],
        is_archived: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.require_cards(ids)?;
        for id in ids {
            if let Some(card) = guard.cards.get_mut(id) {
                card.set_archived(is_archived, now);
            }
        }
        Ok(())
    }

    async fn replace_themes(
        &self,
        ids: &[CardId],
        theme_ids: &BTreeSet<ThemeId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.require_cards(ids)?;
        guard.require_themes(theme_ids)?;
        for id in ids {
            if let Some(card) = guard.cards.get_mut(id) {
                card.replace_themes(theme_ids.clone(), now);
            }
        }
        Ok(())
    }

    async fn delete_cards(&self, ids: &[CardId]) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.require_cards(ids)?;
        guard.delete_cards(ids);
        Ok(())
    }

    async fn replace_cards(
        &self,
        old: &[CardId],
        drafts: Vec<CardDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>, StorageError> {
        let mut guard = self.lock()?;
        guard.require_cards(old)?;
        for draft in &drafts {
            if !guard.quotes.contains_key(&draft.quote_id) {
                return Err(StorageError::NotFound);
            }
            guard.require_themes(&draft.theme_ids)?;
            draft
                .validate()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
        }
        guard.delete_cards(old);
        drafts
            .into_iter()
            .map(|draft| guard.insert_card(draft, now))
            .collect()
    }
}

#[async_trait]
impl CardSetRepository for InMemoryRepository {
    async fn create_set(
        &self,
        owner: UserId,
        name: &SetName,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CardSet, StorageError> {
        let mut guard = self.lock()?;
        let set = CardSet::new(
            CardSetId::new(guard.allocate()),
            owner,
            name.clone(),
            description.map(str::to_owned),
            now,
            now,
        );
        guard.sets.insert(set.id(), set.clone());
        Ok(set)
    }

    async fn get_set(&self, id: CardSetId) -> Result<CardSet, StorageError> {
        let guard = self.lock()?;
        guard.sets.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_sets(&self, owner: UserId) -> Result<Vec<CardSetSummary>, StorageError> {
        let guard = self.lock()?;
        let mut sets: Vec<CardSetSummary> = guard
            .sets
            .values()
            .filter(|s| s.is_owned_by(owner))
            .map(|set| CardSetSummary {
                card_count: guard
                    .set_items
                    .get(&set.id())
                    .map_or(0, |items| u32::try_from(items.len()).unwrap_or(u32::MAX)),
                set: set.clone(),
            })
            .collect();
        sets.sort_by(|a, b| {
            b.set
                .created_at()
                .cmp(&a.set.created_at())
                .then(b.set.id().cmp(&a.set.id()))
        });
        Ok(sets)
    }

    async fn delete_set(&self, id: CardSetId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.sets.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        guard.set_items.remove(&id);
        Ok(())
    }

    async fn add_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<CardSetItem, StorageError> {
        let mut guard = self.lock()?;
        if !guard.sets.contains_key(&set_id) || !guard.cards.contains_key(&card_id) {
            return Err(StorageError::NotFound);
        }
        let items = guard.set_items.entry(set_id).or_default();
        if let Some(existing) = items.iter().find(|item| item.card_id == card_id) {
            return Ok(*existing);
        }
        let item = CardSetItem {
            set_id,
            card_id,
            added_at: now,
        };
        items.push(item);
        if let Some(set) = guard.sets.get_mut(&set_id) {
            set.touch(now);
        }
        Ok(item)
    }

    async fn remove_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.sets.contains_key(&set_id) {
            return Err(StorageError::NotFound);
        }
        let removed = guard.set_items.get_mut(&set_id).is_some_and(|items| {
            let before = items.len();
            items.retain(|item| item.card_id != card_id);
            items.len() != before
        });
        if removed {
            if let Some(set) = guard.sets.get_mut(&set_id) {
                set.touch(now);
            }
        }
        Ok(())
    }

    async fn list_cards_in_set(&self, set_id: CardSetId) -> Result<Vec<Card>, StorageError> {
        let guard = self.lock()?;
        let mut items = guard.set_members(set_id)?.to_vec();
        items.sort_by_key(|item| (item.added_at, item.card_id));
        Ok(items
            .iter()
            .filter_map(|item| guard.cards.get(&item.card_id).cloned())
            .collect())
    }

    async fn count_cards(&self, set_id: CardSetId) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        let members = guard.set_members(set_id)?;
        Ok(u32::try_from(members.len()).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Option<CardProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&(user_id, card_id)).cloned())
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<CardProgress>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<CardProgress> = guard
            .progress
            .values()
            .filter(|p| p.user_id() == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(CardProgress::card_id);
        Ok(rows)
    }

    async fn due_progress(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<CardProgress>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<CardProgress> = guard
            .progress
            .values()
            .filter(|p| p.user_id() == user_id && p.is_due(now))
            .filter(|p| guard.cards.get(&p.card_id()).is_some_and(Card::is_visible))
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.next_review_at(), p.card_id()));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn record_attempt(
        &self,
        progress: &CardProgress,
        attempt: &AttemptRecord,
    ) -> Result<(), StorageError> {
        if progress.user_id() != attempt.user_id || progress.card_id() != attempt.card_id {
            return Err(StorageError::Conflict);
        }
        let mut guard = self.lock()?;
        if !guard.cards.contains_key(&progress.card_id()) {
            return Err(StorageError::NotFound);
        }
        guard
            .progress
            .insert((progress.user_id(), progress.card_id()), progress.clone());
        guard.attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<AttemptRecord> = guard
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && since.is_none_or(|s| a.answered_at >= s))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.answered_at);
        Ok(out)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub quotes: Arc<dyn QuoteRepository>,
    pub themes: Arc<dyn ThemeRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub sets: Arc<dyn CardSetRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let quotes: Arc<dyn QuoteRepository> = Arc::new(repo.clone());
        let themes: Arc<dyn ThemeRepository> = Arc::new(repo.clone());
        let cards: Arc<dyn CardRepository> = Arc::new(repo.clone());
        let sets: Arc<dyn CardSetRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self {
            quotes,
            themes,
            cards,
            sets,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsc_core::model::DifficultyLevel;
    use hsc_core::scheduler::Scheduler;
    use hsc_core::time::fixed_now;

    async fn seeded() -> (InMemoryRepository, Quote, Theme) {
        let repo = InMemoryRepository::new();
        let book = repo.insert_book("1984", Some("George Orwell")).await.unwrap();
        let theme = repo
            .insert_theme(
                &ThemeName::new("Power").unwrap(),
                &ThemeColor::new("#FF0000").unwrap(),
            )
            .await
            .unwrap();
        let quote = repo
            .insert_quote(
                NewQuoteRecord::new(book.id, "Slogan", "War is peace").with_themes([theme.id()]),
            )
            .await
            .unwrap();
        (repo, quote, theme)
    }

    fn draft(quote: &Quote, themes: BTreeSet<ThemeId>) -> CardDraft {
        CardDraft {
            quote_id: quote.id,
            card_text: "War is _____".into(),
            missing_words: vec!["peace".into()],
            missing_positions: vec![2],
            difficulty: DifficultyLevel::default(),
            theme_ids: themes,
        }
    }

    #[tokio::test]
    async fn delete_cascades_progress_and_membership() {
        let (repo, quote, _) = seeded().await;
        let card = repo.insert_card(draft(&quote, BTreeSet::new()), fixed_now()).await.unwrap();
        let user = UserId::random();
        let set = repo
            .create_set(user, &SetName::new("Mine").unwrap(), None, fixed_now())
            .await
            .unwrap();
        repo.add_card(set.id(), card.id(), fixed_now()).await.unwrap();
        let applied = Scheduler::default()
            .apply_attempt(user, card.id(), None, true, fixed_now(), None)
            .unwrap();
        repo.record_attempt(&applied.progress, &applied.attempt).await.unwrap();

        repo.delete_cards(&[card.id()]).await.unwrap();

        assert!(matches!(repo.get_card(card.id()).await, Err(StorageError::NotFound)));
        assert_eq!(repo.count_cards(set.id()).await.unwrap(), 0);
        assert!(repo.get_progress(user, card.id()).await.unwrap().is_none());
        assert!(repo.attempts_for_user(user, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_ops_are_all_or_nothing() {
        let (repo, quote, _) = seeded().await;
        let card = repo.insert_card(draft(&quote, BTreeSet::new()), fixed_now()).await.unwrap();

        let err = repo
            .set_active(&[card.id(), CardId::new(999)], false, fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
        assert!(repo.get_card(card.id()).await.unwrap().is_active());

        let err = repo
            .replace_themes(&[card.id()], &[ThemeId::new(999)].into(), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn deleting_a_theme_detaches_it() {
        let (repo, quote, theme) = seeded().await;
        let card = repo
            .insert_card(draft(&quote, [theme.id()].into()), fixed_now())
            .await
            .unwrap();

        repo.delete_theme(theme.id()).await.unwrap();

        assert!(repo.quote_themes(quote.id).await.unwrap().is_empty());
        assert!(repo.get_card(card.id()).await.unwrap().theme_ids().is_empty());
        assert!(repo.get_quote(quote.id).await.is_ok());
    }

    #[tokio::test]
    async fn re_adding_keeps_original_timestamp() {
        let (repo, quote, _) = seeded().await;
        let card = repo.insert_card(draft(&quote, BTreeSet::new()), fixed_now()).await.unwrap();
        let set = repo
            .create_set(UserId::random(), &SetName::new("Exam").unwrap(), None, fixed_now())
            .await
            .unwrap();

        let first = repo.add_card(set.id(), card.id(), fixed_now()).await.unwrap();
        let later = fixed_now() + chrono::Duration::hours(1);
        let again = repo.add_card(set.id(), card.id(), later).await.unwrap();

        assert_eq!(first.added_at, again.added_at);
        assert_eq!(repo.count_cards(set.id()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_attempt_rejects_mismatched_rows() {
        let (repo, quote, _) = seeded().await;
        let card = repo.insert_card(draft(&quote, BTreeSet::new()), fixed_now()).await.unwrap();
        let applied = Scheduler::default()
            .apply_attempt(UserId::random(), card.id(), None, true, fixed_now(), None)
            .unwrap();
        let mut attempt = applied.attempt.clone();
        attempt.user_id = UserId::random();

        let err = repo.record_attempt(&applied.progress, &attempt).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }
}
