use serde::{Deserialize, Serialize};

use crate::model::ids::{BookId, QuoteId};

/// A prescribed text that quotes belong to (novel, play, poetry anthology).
///
/// Progress aggregates are grouped per book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: Option<String>,
}

impl Book {
    #[must_use]
    pub fn new(id: BookId, title: impl Into<String>, author: Option<String>) -> Self {
        Self {
            id,
            title: title.into(),
            author,
        }
    }
}

/// A source passage owned by the quote store.
///
/// Cards are generated from quotes. An edited quote is regenerated rather
/// than patched in place, so the text here is treated as immutable once a
/// card points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub book_id: BookId,
    pub title: String,
    pub text: String,
    /// Where in the book the quote comes from, e.g. "Part 1, Chapter 2".
    pub source: Option<String>,
    pub is_active: bool,
}

impl Quote {
    #[must_use]
    pub fn new(
        id: QuoteId,
        book_id: BookId,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            book_id,
            title: title.into(),
            text: text.into(),
            source: None,
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
