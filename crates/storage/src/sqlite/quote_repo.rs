use std::collections::BTreeSet;

use hsc_core::model::{Book, BookId, Quote, QuoteId, Theme, ThemeColor, ThemeId, ThemeName};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_book_row, map_quote_row, map_theme_row, ser, write_err},
};
use crate::repository::{NewQuoteRecord, QuoteRepository, StorageError, ThemeRepository};

#[async_trait::async_trait]
impl QuoteRepository for SqliteRepository {
    async fn insert_book(&self, title: &str, author: Option<&str>) -> Result<Book, StorageError> {
        let res = sqlx::query("INSERT INTO books (title, author) VALUES (?1, ?2)")
            .bind(title)
            .bind(author)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(Book::new(BookId::new(id), title, author.map(str::to_owned)))
    }

    async fn get_book(&self, id: BookId) -> Result<Book, StorageError> {
        let row = sqlx::query("SELECT id, title, author FROM books WHERE id = ?1")
            .bind(id_i64("book_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_book_row(&row)
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let rows = sqlx::query("SELECT id, title, author FROM books ORDER BY title ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_book_row).collect()
    }

    async fn insert_quote(&self, record: NewQuoteRecord) -> Result<Quote, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO quotes (book_id, title, text, source, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id_i64("book_id", record.book_id.value())?)
        .bind(&record.title)
        .bind(&record.text)
        .bind(&record.source)
        .bind(record.is_active)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        let quote_id = res.last_insert_rowid();

        for theme in &record.theme_ids {
            sqlx::query("INSERT INTO quote_themes (quote_id, theme_id) VALUES (?1, ?2)")
                .bind(quote_id)
                .bind(id_i64("theme_id", theme.value())?)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;

        Ok(Quote {
            id: QuoteId::new(u64::try_from(quote_id).map_err(ser)?),
            book_id: record.book_id,
            title: record.title,
            text: record.text,
            source: record.source,
            is_active: record.is_active,
        })
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Quote, StorageError> {
        let row = sqlx::query(
            "SELECT id, book_id, title, text, source, is_active FROM quotes WHERE id = ?1",
        )
        .bind(id_i64("quote_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_quote_row(&row)
    }

    async fn list_quotes_by_book(&self, book_id: BookId) -> Result<Vec<Quote>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, book_id, title, text, source, is_active
            FROM quotes
            WHERE book_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id_i64("book_id", book_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_quote_row).collect()
    }

    async fn quote_themes(&self, id: QuoteId) -> Result<BTreeSet<ThemeId>, StorageError> {
        let quote = id_i64("quote_id", id.value())?;
        let exists = sqlx::query("SELECT 1 FROM quotes WHERE id = ?1")
            .bind(quote)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query("SELECT theme_id FROM quote_themes WHERE quote_id = ?1")
            .bind(quote)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter()
            .map(|row| {
                let raw: i64 = row.try_get("theme_id").map_err(ser)?;
                Ok(ThemeId::new(u64::try_from(raw).map_err(ser)?))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ThemeRepository for SqliteRepository {
    async fn insert_theme(
        &self,
        name: &ThemeName,
        color: &ThemeColor,
    ) -> Result<Theme, StorageError> {
        let res = sqlx::query("INSERT INTO themes (name, color) VALUES (?1, ?2)")
            .bind(name.as_str())
            .bind(color.as_str())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(Theme::new(ThemeId::new(id), name.clone(), color.clone()))
    }

    async fn list_themes(&self) -> Result<Vec<Theme>, StorageError> {
        let rows = sqlx::query("SELECT id, name, color FROM themes ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_theme_row).collect()
    }

    async fn delete_theme(&self, id: ThemeId) -> Result<(), StorageError> {
        // Join rows in quote_themes and card_themes go with it (ON DELETE CASCADE).
        let res = sqlx::query("DELETE FROM themes WHERE id = ?1")
            .bind(id_i64("theme_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
