use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use hsc_core::model::{
    AttemptRecord, Book, BookId, Card, CardDraft, CardId, CardListing, CardProgress, CardSet,
    CardSetId, DifficultyLevel, Quote, QuoteId, SetName, Theme, ThemeColor, ThemeId, ThemeName,
    UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Constraint violations map onto the repository contract; the rest is a
/// connection problem.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    conn(e)
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn card_id_i64(id: CardId) -> Result<i64, StorageError> {
    id_i64("card_id", id.value())
}

pub(crate) fn card_ids_i64(ids: &[CardId]) -> Result<Vec<i64>, StorageError> {
    ids.iter().copied().map(card_id_i64).collect()
}

pub(crate) fn user_text(id: UserId) -> String {
    id.value().to_string()
}

fn user_from_text(raw: &str) -> Result<UserId, StorageError> {
    raw.parse().map_err(ser)
}

/// `?start, ?start+1, ...` for `n` bound values.
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    let mut sql = String::new();
    for i in 0..n {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        sql.push_str(&(start + i).to_string());
    }
    sql
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn parse_theme_list(raw: Option<String>) -> Result<BTreeSet<ThemeId>, StorageError> {
    let Some(raw) = raw else {
        return Ok(BTreeSet::new());
    };
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.parse::<ThemeId>().map_err(ser))
        .collect()
}

pub(crate) fn map_book_row(row: &SqliteRow) -> Result<Book, StorageError> {
    Ok(Book::new(
        BookId::new(i64_to_u64("book_id", row.try_get("id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("author").map_err(ser)?,
    ))
}

pub(crate) fn map_quote_row(row: &SqliteRow) -> Result<Quote, StorageError> {
    Ok(Quote {
        id: QuoteId::new(i64_to_u64("quote_id", row.try_get("id").map_err(ser)?)?),
        book_id: BookId::new(i64_to_u64("book_id", row.try_get("book_id").map_err(ser)?)?),
        title: row.try_get("title").map_err(ser)?,
        text: row.try_get("text").map_err(ser)?,
        source: row.try_get("source").map_err(ser)?,
        is_active: row.try_get("is_active").map_err(ser)?,
    })
}

pub(crate) fn map_theme_row(row: &SqliteRow) -> Result<Theme, StorageError> {
    Ok(Theme::new(
        ThemeId::new(i64_to_u64("theme_id", row.try_get("id").map_err(ser)?)?),
        ThemeName::new(row.try_get::<String, _>("name").map_err(ser)?).map_err(ser)?,
        ThemeColor::new(row.try_get::<String, _>("color").map_err(ser)?).map_err(ser)?,
    ))
}

/// Shared card projection; `theme_ids` is a comma list from `card_themes`.
pub(crate) const CARD_COLUMNS: &str = r"
    c.id, c.quote_id, c.card_text, c.missing_words, c.missing_positions, c.difficulty,
    c.is_active, c.is_archived, c.created_at, c.updated_at,
    (SELECT group_concat(ct.theme_id) FROM card_themes ct WHERE ct.card_id = c.id) AS theme_ids
";

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let words: String = row.try_get("missing_words").map_err(ser)?;
    let positions: String = row.try_get("missing_positions").map_err(ser)?;
    let difficulty: i64 = row.try_get("difficulty").map_err(ser)?;
    let difficulty = u8::try_from(difficulty)
        .map_err(|_| StorageError::Serialization(format!("invalid difficulty: {difficulty}")))?;

    let draft = CardDraft {
        quote_id: QuoteId::new(i64_to_u64("quote_id", row.try_get("quote_id").map_err(ser)?)?),
        card_text: row.try_get("card_text").map_err(ser)?,
        missing_words: serde_json::from_str(&words).map_err(ser)?,
        missing_positions: serde_json::from_str(&positions).map_err(ser)?,
        difficulty: DifficultyLevel::new(difficulty).map_err(ser)?,
        theme_ids: parse_theme_list(row.try_get("theme_ids").map_err(ser)?)?,
    };

    Card::from_persisted(
        CardId::new(i64_to_u64("card_id", row.try_get("id").map_err(ser)?)?),
        draft,
        row.try_get("is_active").map_err(ser)?,
        row.try_get("is_archived").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

/// Card row joined with `quotes q` (`q.book_id`, `q.title`, `q.text`).
pub(crate) fn map_listing_row(row: &SqliteRow) -> Result<CardListing, StorageError> {
    Ok(CardListing {
        card: map_card_row(row)?,
        book_id: BookId::new(i64_to_u64("book_id", row.try_get("book_id").map_err(ser)?)?),
        quote_title: row.try_get("quote_title").map_err(ser)?,
        quote_text: row.try_get("quote_text").map_err(ser)?,
    })
}

pub(crate) fn map_set_row(row: &SqliteRow) -> Result<CardSet, StorageError> {
    Ok(CardSet::new(
        CardSetId::new(i64_to_u64("set_id", row.try_get("id").map_err(ser)?)?),
        user_from_text(row.try_get::<&str, _>("owner").map_err(ser)?)?,
        SetName::new(row.try_get::<String, _>("name").map_err(ser)?).map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    ))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<CardProgress, StorageError> {
    let last: DateTime<Utc> = row.try_get("last_attempt_at").map_err(ser)?;
    let next: DateTime<Utc> = row.try_get("next_review_at").map_err(ser)?;
    CardProgress::from_persisted(
        user_from_text(row.try_get::<&str, _>("user_id").map_err(ser)?)?,
        CardId::new(i64_to_u64("card_id", row.try_get("card_id").map_err(ser)?)?),
        i64_to_u32("attempts", row.try_get("attempts").map_err(ser)?)?,
        i64_to_u32("correct_attempts", row.try_get("correct_attempts").map_err(ser)?)?,
        last,
        next,
        row.try_get("ease_factor").map_err(ser)?,
        i64_to_u32("interval_days", row.try_get("interval_days").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRecord, StorageError> {
    Ok(AttemptRecord {
        user_id: user_from_text(row.try_get::<&str, _>("user_id").map_err(ser)?)?,
        card_id: CardId::new(i64_to_u64("card_id", row.try_get("card_id").map_err(ser)?)?),
        is_correct: row.try_get("is_correct").map_err(ser)?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
        response_time_ms: row
            .try_get::<Option<i64>, _>("response_time_ms")
            .map_err(ser)?
            .map(|ms| i64_to_u64("response_time_ms", ms))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
        assert_eq!(placeholders(1, 0), "");
    }

    #[test]
    fn theme_lists_parse() {
        let ids = parse_theme_list(Some("3,1".into())).unwrap();
        assert_eq!(ids.into_iter().map(|t| t.value()).collect::<Vec<_>>(), vec![1, 3]);
        assert!(parse_theme_list(None).unwrap().is_empty());
        assert!(parse_theme_list(Some("x".into())).is_err());
    }
}
