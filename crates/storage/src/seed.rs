//! Demo content: two prescribed texts, a handful of themes and quotes, and
//! one generated card per quote.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use hsc_core::generator::{RedactionPolicy, generate_card};
use hsc_core::model::{ThemeColor, ThemeId, ThemeName};
use thiserror::Error;

use crate::repository::{NewQuoteRecord, Storage, StorageError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeedError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid seed data: {0}")]
    Data(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub books: u32,
    pub themes: u32,
    pub quotes: u32,
    pub cards: u32,
    /// True when the store already held books and nothing was written.
    pub skipped: bool,
}

const THEMES: &[(&str, &str)] = &[
    ("Power", "#dc2626"),
    ("Truth", "#9333ea"),
    ("Identity", "#2563eb"),
    ("Ambition", "#16a34a"),
];

struct SeedQuote {
    title: &'static str,
    text: &'static str,
    source: &'static str,
    themes: &'static [&'static str],
}

struct SeedBook {
    title: &'static str,
    author: &'static str,
    quotes: &'static [SeedQuote],
}

const BOOKS: &[SeedBook] = &[
    SeedBook {
        title: "1984",
        author: "George Orwell",
        quotes: &[
            SeedQuote {
                title: "Party slogans",
                text: "War is peace. Freedom is slavery. Ignorance is strength.",
                source: "Part 1, Chapter 1",
                themes: &["Power"],
            },
            SeedQuote {
                title: "Control of the past",
                text: "Who controls the past controls the future. Who controls the present controls the past.",
                source: "Part 1, Chapter 3",
                themes: &["Power", "Truth"],
            },
            SeedQuote {
                title: "Telescreen poster",
                text: "Big Brother is watching you.",
                source: "Part 1, Chapter 1",
                themes: &["Power"],
            },
            SeedQuote {
                title: "The proles",
                text: "Until they become conscious they will never rebel.",
                source: "Part 1, Chapter 7",
                themes: &["Identity"],
            },
        ],
    },
    SeedBook {
        title: "Macbeth",
        author: "William Shakespeare",
        quotes: &[
            SeedQuote {
                title: "Witches' chant",
                text: "Fair is foul, and foul is fair.",
                source: "Act 1, Scene 1",
                themes: &["Truth"],
            },
            SeedQuote {
                title: "Vaulting ambition",
                text: "I have no spur to prick the sides of my intent, but only vaulting ambition.",
                source: "Act 1, Scene 7",
                themes: &["Ambition"],
            },
            SeedQuote {
                title: "Sleepwalking",
                text: "Out, damned spot! Out, I say!",
                source: "Act 5, Scene 1",
                themes: &["Identity"],
            },
            SeedQuote {
                title: "Tomorrow soliloquy",
                text: "Life's but a walking shadow, a poor player that struts and frets his hour upon the stage.",
                source: "Act 5, Scene 5",
                themes: &["Ambition", "Truth"],
            },
        ],
    },
];

/// Write the demo content unless the store already has books.
///
/// # Errors
///
/// Returns `SeedError` if a write fails or a bundled quote cannot produce a card.
pub async fn seed_demo_content(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    if !storage.quotes.list_books().await?.is_empty() {
        report.skipped = true;
        return Ok(report);
    }

    let mut theme_ids: HashMap<&str, ThemeId> = HashMap::new();
    for (name, color) in THEMES {
        let name_value = ThemeName::new(*name).map_err(|e| SeedError::Data(e.to_string()))?;
        let color_value = ThemeColor::new(*color).map_err(|e| SeedError::Data(e.to_string()))?;
        let theme = storage.themes.insert_theme(&name_value, &color_value).await?;
        theme_ids.insert(*name, theme.id());
        report.themes += 1;
    }

    let policy = RedactionPolicy::default();
    for seed_book in BOOKS {
        let book = storage
            .quotes
            .insert_book(seed_book.title, Some(seed_book.author))
            .await?;
        report.books += 1;

        for seed_quote in seed_book.quotes {
            let themes: BTreeSet<ThemeId> = seed_quote
                .themes
                .iter()
                .filter_map(|name| theme_ids.get(name).copied())
                .collect();
            let mut record = NewQuoteRecord::new(book.id, seed_quote.title, seed_quote.text)
                .with_themes(themes.iter().copied());
            record.source = Some(seed_quote.source.to_string());
            let quote = storage.quotes.insert_quote(record).await?;
            report.quotes += 1;

            let draft = generate_card(&quote, &themes, &policy)
                .map_err(|e| SeedError::Data(format!("{}: {e}", seed_quote.title)))?;
            storage.cards.insert_card(draft, now).await?;
            report.cards += 1;
        }
    }

    Ok(report)
}
