use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use hsc_core::model::{Card, CardDraft, CardFilter, CardId, CardListing, QuoteId, ThemeId};
use sqlx::{Row, SqliteConnection};

use super::{
    SqliteRepository,
    mapping::{
        CARD_COLUMNS, card_id_i64, card_ids_i64, conn, id_i64, map_card_row, map_listing_row,
        placeholders, ser, to_json, write_err,
    },
};
use crate::repository::{CardRepository, StorageError};

fn listing_sql(where_clause: &str) -> String {
    format!(
        r"
        SELECT {CARD_COLUMNS}, q.book_id AS book_id, q.title AS quote_title, q.text AS quote_text
        FROM cards c
        JOIN quotes q ON q.id = c.quote_id
        WHERE {where_clause}
        ORDER BY c.created_at ASC, c.id ASC
        "
    )
}

async fn count_existing(
    conn_ref: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<usize, StorageError> {
    let sql = format!(
        "SELECT COUNT(*) AS n FROM {table} WHERE id IN ({})",
        placeholders(1, ids.len())
    );
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(*id);
    }
    let row = q.fetch_one(&mut *conn_ref).await.map_err(conn)?;
    let n: i64 = row.try_get("n").map_err(ser)?;
    usize::try_from(n).map_err(ser)
}

/// `NotFound` unless every id exists in `table`.
async fn ensure_all(
    conn_ref: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<(), StorageError> {
    let mut distinct = ids.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.is_empty() {
        return Ok(());
    }
    if count_existing(conn_ref, table, &distinct).await? == distinct.len() {
        Ok(())
    } else {
        Err(StorageError::NotFound)
    }
}

fn theme_ids_i64(ids: &BTreeSet<ThemeId>) -> Result<Vec<i64>, StorageError> {
    ids.iter().map(|t| id_i64("theme_id", t.value())).collect()
}

async fn insert_card(
    conn_ref: &mut SqliteConnection,
    draft: CardDraft,
    now: DateTime<Utc>,
) -> Result<Card, StorageError> {
    draft.validate().map_err(ser)?;
    let res = sqlx::query(
        r"
        INSERT INTO cards (
            quote_id, card_text, missing_words, missing_positions, difficulty,
            is_active, is_archived, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, ?6, ?6)
        ",
    )
    .bind(id_i64("quote_id", draft.quote_id.value())?)
    .bind(&draft.card_text)
    .bind(to_json(&draft.missing_words)?)
    .bind(to_json(&draft.missing_positions)?)
    .bind(i64::from(draft.difficulty.value()))
    .bind(now)
    .execute(&mut *conn_ref)
    .await
    .map_err(write_err)?;
    let card_id = res.last_insert_rowid();

    write_card_themes(conn_ref, card_id, &draft.theme_ids).await?;

    let id = CardId::new(u64::try_from(card_id).map_err(ser)?);
    draft.assign_id(id, now).map_err(ser)
}

async fn write_card_themes(
    conn_ref: &mut SqliteConnection,
    card_id: i64,
    theme_ids: &BTreeSet<ThemeId>,
) -> Result<(), StorageError> {
    for theme in theme_ids_i64(theme_ids)? {
        sqlx::query("INSERT INTO card_themes (card_id, theme_id) VALUES (?1, ?2)")
            .bind(card_id)
            .bind(theme)
            .execute(&mut *conn_ref)
            .await
            .map_err(write_err)?;
    }
    Ok(())
}

/// Set items, progress and attempts cascade from `cards`.
async fn delete_cards(conn_ref: &mut SqliteConnection, ids: &[i64]) -> Result<(), StorageError> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!("DELETE FROM cards WHERE id IN ({})", placeholders(1, ids.len()));
    let mut q = sqlx::query(&sql);
    for id in ids {
        q = q.bind(*id);
    }
    q.execute(&mut *conn_ref).await.map_err(conn)?;
    Ok(())
}

/// Update one boolean column on every card in `ids`, touching `updated_at`
/// only on rows whose value changes.
async fn set_flag(
    repo: &SqliteRepository,
    column: &'static str,
    ids: &[CardId],
    value: bool,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    let raw = card_ids_i64(ids)?;
    let mut tx = repo.pool.begin().await.map_err(conn)?;
    ensure_all(&mut tx, "cards", &raw).await?;

    let sql = format!(
        "UPDATE cards SET {column} = ?1, updated_at = ?2 WHERE {column} <> ?1 AND id IN ({})",
        placeholders(3, raw.len())
    );
    let mut q = sqlx::query(&sql).bind(value).bind(now);
    for id in &raw {
        q = q.bind(*id);
    }
    q.execute(&mut *tx).await.map_err(conn)?;

    tx.commit().await.map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl CardRepository for SqliteRepository {
    async fn insert_card(
        &self,
        draft: CardDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Card, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let card = insert_card(&mut tx, draft, created_at).await?;
        tx.commit().await.map_err(conn)?;
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards c WHERE c.id = ?1");
        let row = sqlx::query(&sql)
            .bind(card_id_i64(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_card_row(&row)
    }

    async fn get_cards(&self, ids: &[CardId]) -> Result<Vec<Card>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw = card_ids_i64(ids)?;
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.id IN ({})",
            placeholders(1, raw.len())
        );
        let mut q = sqlx::query(&sql);
        for id in &raw {
            q = q.bind(*id);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<CardId, Card> = HashMap::with_capacity(rows.len());
        for row in rows {
            let card = map_card_row(&row)?;
            by_id.insert(card.id(), card);
        }

        ids.iter()
            .map(|id| by_id.get(id).cloned().ok_or(StorageError::NotFound))
            .collect()
    }

    async fn cards_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Card>, StorageError> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards c WHERE c.quote_id = ?1 ORDER BY c.created_at, c.id"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("quote_id", quote_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_card_row).collect()
    }

    async fn list_listings(&self) -> Result<Vec<CardListing>, StorageError> {
        let rows = sqlx::query(&listing_sql("1 = 1"))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_listing_row).collect()
    }

    async fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>, StorageError> {
        // Exact-match dimensions narrow the scan; the filter itself decides.
        let mut clauses = vec!["1 = 1".to_string()];
        let mut binds: Vec<i64> = Vec::new();
        if let Some(book) = filter.book_id {
            binds.push(id_i64("book_id", book.value())?);
            clauses.push(format!("q.book_id = ?{}", binds.len()));
        }
        if let Some(level) = filter.difficulty_level {
            binds.push(i64::from(level.value()));
            clauses.push(format!("c.difficulty = ?{}", binds.len()));
        }
        if filter.only_active {
            clauses.push("c.is_active = 1".into());
        }
        if !filter.include_archived {
            clauses.push("c.is_archived = 0".into());
        }

        let sql = listing_sql(&clauses.join(" AND "));
        let mut q = sqlx::query(&sql);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
        let listings = rows
            .iter()
            .map(map_listing_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(filter.apply(listings))
    }

    async fn set_active(
        &self,
        ids: &[CardId],
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        set_flag(self, "is_active", ids, is_active, now).await
    }

    async fn set_archived(
        &self,
        ids: &[CardId],
        is_archived: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        set_flag(self, "is_archived", ids, is_archived, now).await
    }

    async fn replace_themes(
        &self,
        ids: &[CardId],
        theme_ids: &BTreeSet<ThemeId>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let raw = card_ids_i64(ids)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        ensure_all(&mut tx, "cards", &raw).await?;
        ensure_all(&mut tx, "themes", &theme_ids_i64(theme_ids)?).await?;

        for card in &raw {
            sqlx::query("DELETE FROM card_themes WHERE card_id = ?1")
                .bind(*card)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            write_card_themes(&mut tx, *card, theme_ids).await?;
            sqlx::query("UPDATE cards SET updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(*card)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn delete_cards(&self, ids: &[CardId]) -> Result<(), StorageError> {
        let raw = card_ids_i64(ids)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        ensure_all(&mut tx, "cards", &raw).await?;
        delete_cards(&mut tx, &raw).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn replace_cards(
        &self,
        old: &[CardId],
        drafts: Vec<CardDraft>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>, StorageError> {
        let raw = card_ids_i64(old)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        ensure_all(&mut tx, "cards", &raw).await?;
        delete_cards(&mut tx, &raw).await?;

        let mut cards = Vec::with_capacity(drafts.len());
        for draft in drafts {
            cards.push(insert_card(&mut tx, draft, now).await?);
        }

        tx.commit().await.map_err(conn)?;
        Ok(cards)
    }
}
