mod card;
mod card_set;
mod catalog;
mod ids;
mod progress;
mod quote;
mod theme;

pub use ids::{BookId, CardId, CardSetId, ParseIdError, QuoteId, ThemeId, UserId};

pub use card::{BLANK_MARKER, Card, CardDraft, CardError, DifficultyLevel};
pub use card_set::{CardSet, CardSetError, CardSetItem, CardSetSummary, SetName};
pub use catalog::{CardFilter, CardListing};
pub use progress::{AttemptRecord, CardProgress, ProgressError};
pub use quote::{Book, Quote};
pub use theme::{Theme, ThemeColor, ThemeError, ThemeName};
