use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use hsc_core::generator::{GeneratorError, RedactionPolicy, generate_card};
use hsc_core::model::{Book, BookId, Card, CardDraft, CardFilter, CardId, QuoteId, Theme, ThemeId};
use storage::repository::{CardRepository, QuoteRepository, ThemeRepository};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::CatalogError;
use crate::retry::read_with_retry;

/// A quote of the book that produced no card, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    pub quote_id: QuoteId,
    pub quote_title: String,
    pub error: GeneratorError,
}

/// Outcome of generating cards for every active quote of a book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookGeneration {
    pub book: Book,
    pub generated: Vec<Card>,
    pub failures: Vec<GenerationFailure>,
}

/// Card generation, catalog queries, and bulk curation.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    quotes: Arc<dyn QuoteRepository>,
    themes: Arc<dyn ThemeRepository>,
    cards: Arc<dyn CardRepository>,
}

/// Non-empty, duplicate-free selection in caller order.
fn selection(ids: &[CardId]) -> Result<Vec<CardId>, CatalogError> {
    if ids.is_empty() {
        return Err(CatalogError::EmptySelection);
    }
    let mut seen = HashSet::with_capacity(ids.len());
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

impl CatalogService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quotes: Arc<dyn QuoteRepository>,
        themes: Arc<dyn ThemeRepository>,
        cards: Arc<dyn CardRepository>,
    ) -> Self {
        Self {
            clock,
            quotes,
            themes,
            cards,
        }
    }

    async fn draft_for_quote(
        &self,
        quote_id: QuoteId,
        policy: &RedactionPolicy,
    ) -> Result<CardDraft, CatalogError> {
        let quote = read_with_retry("get_quote", || self.quotes.get_quote(quote_id)).await?;
        let themes = read_with_retry("quote_themes", || self.quotes.quote_themes(quote_id)).await?;
        generate_card(&quote, &themes, policy)
            .map_err(|source| CatalogError::Generation { quote_id, source })
    }

    /// Generate and store one card for a quote. The card inherits the
    /// quote's themes at this moment.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Generation` when the quote cannot satisfy the
    /// policy, or `CatalogError::Storage` (`NotFound` for an unknown quote).
    pub async fn generate_for_quote(
        &self,
        quote_id: QuoteId,
        policy: &RedactionPolicy,
    ) -> Result<Card, CatalogError> {
        let draft = self.draft_for_quote(quote_id, policy).await?;
        let card = self.cards.insert_card(draft, self.clock.now()).await?;
        info!(quote_id = %quote_id, card_id = %card.id(), "generated card");
        Ok(card)
    }

    /// Generate one card per active quote of a book.
    ///
    /// Quotes that cannot satisfy the policy are reported in
    /// `BookGeneration::failures`; storage failures abort the run.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` (`NotFound` for an unknown book).
    pub async fn generate_for_book(
        &self,
        book_id: BookId,
        policy: &RedactionPolicy,
    ) -> Result<BookGeneration, CatalogError> {
        let book = read_with_retry("get_book", || self.quotes.get_book(book_id)).await?;
        let quotes =
            read_with_retry("list_quotes_by_book", || self.quotes.list_quotes_by_book(book_id))
                .await?;

        let mut generated = Vec::new();
        let mut failures = Vec::new();
        for quote in quotes.into_iter().filter(|q| q.is_active) {
            match self.generate_for_quote(quote.id, policy).await {
                Ok(card) => generated.push(card),
                Err(CatalogError::Generation { quote_id, source }) => {
                    warn!(%quote_id, error = %source, "quote skipped during generation");
                    failures.push(GenerationFailure {
                        quote_id,
                        quote_title: quote.title,
                        error: source,
                    });
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            book_id = %book_id,
            generated = generated.len(),
            failed = failures.len(),
            "generated cards for book"
        );
        Ok(BookGeneration {
            book,
            generated,
            failures,
        })
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the store cannot be read.
    pub async fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>, CatalogError> {
        let cards = read_with_retry("list_cards", || self.cards.list_cards(filter)).await?;
        debug!(count = cards.len(), "listed cards");
        Ok(cards)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` (`NotFound` if missing).
    pub async fn get_card(&self, id: CardId) -> Result<Card, CatalogError> {
        Ok(read_with_retry("get_card", || self.cards.get_card(id)).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the store cannot be read.
    pub async fn cards_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Card>, CatalogError> {
        Ok(read_with_retry("cards_for_quote", || self.cards.cards_for_quote(quote_id)).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the store cannot be read.
    pub async fn list_books(&self) -> Result<Vec<Book>, CatalogError> {
        Ok(read_with_retry("list_books", || self.quotes.list_books()).await?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if the store cannot be read.
    pub async fn list_themes(&self) -> Result<Vec<Theme>, CatalogError> {
        Ok(read_with_retry("list_themes", || self.themes.list_themes()).await?)
    }

    /// Show or hide cards from students. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::EmptySelection` for an empty id list and
    /// `CatalogError::Storage` (`NotFound` if any id is unknown).
    pub async fn bulk_toggle_active(
        &self,
        ids: &[CardId],
        is_active: bool,
    ) -> Result<(), CatalogError> {
        let ids = selection(ids)?;
        self.cards
            .set_active(&ids, is_active, self.clock.now())
            .await?;
        info!(count = ids.len(), is_active, "toggled card visibility");
        Ok(())
    }

    /// Archive or restore cards. Independent of the active flag.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogService::bulk_toggle_active`].
    pub async fn bulk_archive(&self, ids: &[CardId], archived: bool) -> Result<(), CatalogError> {
        let ids = selection(ids)?;
        self.cards
            .set_archived(&ids, archived, self.clock.now())
            .await?;
        info!(count = ids.len(), archived, "archived cards");
        Ok(())
    }

    /// Hard delete. Set memberships, progress rows and attempts go too.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogService::bulk_toggle_active`].
    pub async fn bulk_delete(&self, ids: &[CardId]) -> Result<(), CatalogError> {
        let ids = selection(ids)?;
        self.cards.delete_cards(&ids).await?;
        info!(count = ids.len(), "deleted cards");
        Ok(())
    }

    /// Replace each card's themes with exactly `theme_ids`.
    ///
    /// # Errors
    ///
    /// Same as [`CatalogService::bulk_toggle_active`]; an unknown theme is
    /// also `NotFound`.
    pub async fn bulk_update_themes(
        &self,
        ids: &[CardId],
        theme_ids: &BTreeSet<ThemeId>,
    ) -> Result<(), CatalogError> {
        let ids = selection(ids)?;
        self.cards
            .replace_themes(&ids, theme_ids, self.clock.now())
            .await?;
        info!(count = ids.len(), themes = theme_ids.len(), "retagged cards");
        Ok(())
    }

    /// Re-run generation for each card's quote and swap the new cards in.
    ///
    /// New cards get new ids, so progress on the old ones is dropped. Every
    /// draft is built before anything is written; one failure leaves the
    /// catalog untouched. Each new card keeps the themes of the card it
    /// replaces.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Regeneration` when a quote no longer satisfies
    /// the policy, plus the errors of [`CatalogService::bulk_toggle_active`].
    pub async fn bulk_regenerate(
        &self,
        ids: &[CardId],
        policy: &RedactionPolicy,
    ) -> Result<Vec<Card>, CatalogError> {
        let ids = selection(ids)?;
        let old = read_with_retry("get_cards", || self.cards.get_cards(&ids)).await?;

        let mut drafts = Vec::with_capacity(old.len());
        for card in &old {
            let quote =
                read_with_retry("get_quote", || self.quotes.get_quote(card.quote_id())).await?;
            let draft = generate_card(&quote, card.theme_ids(), policy).map_err(|source| {
                CatalogError::Regeneration {
                    card_id: card.id(),
                    source,
                }
            })?;
            drafts.push(draft);
        }

        let fresh = self
            .cards
            .replace_cards(&ids, drafts, self.clock.now())
            .await?;
        info!(count = fresh.len(), "regenerated cards");
        Ok(fresh)
    }
}
