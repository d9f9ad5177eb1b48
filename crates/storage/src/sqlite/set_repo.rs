use chrono::{DateTime, Utc};
use hsc_core::model::{
    Card, CardId, CardSet, CardSetId, CardSetItem, CardSetSummary, SetName, UserId,
};
use sqlx::{Row, SqliteConnection};

use super::{
    SqliteRepository,
    mapping::{
        CARD_COLUMNS, card_id_i64, conn, id_i64, map_card_row, map_set_row, ser, user_text,
        write_err,
    },
};
use crate::repository::{CardSetRepository, StorageError};

const SET_COLUMNS: &str = "id, owner, name, description, created_at, updated_at";

async fn require_set(conn_ref: &mut SqliteConnection, set: i64) -> Result<(), StorageError> {
    sqlx::query("SELECT 1 FROM card_sets WHERE id = ?1")
        .bind(set)
        .fetch_optional(&mut *conn_ref)
        .await
        .map_err(conn)?
        .map(|_| ())
        .ok_or(StorageError::NotFound)
}

async fn touch_set(
    conn_ref: &mut SqliteConnection,
    set: i64,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE card_sets SET updated_at = ?1 WHERE id = ?2 AND updated_at < ?1")
        .bind(now)
        .bind(set)
        .execute(&mut *conn_ref)
        .await
        .map_err(conn)?;
    Ok(())
}

fn count_u32(row: &sqlx::sqlite::SqliteRow) -> Result<u32, StorageError> {
    let n: i64 = row.try_get("card_count").map_err(ser)?;
    u32::try_from(n).map_err(ser)
}

#[async_trait::async_trait]
impl CardSetRepository for SqliteRepository {
    async fn create_set(
        &self,
        owner: UserId,
        name: &SetName,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CardSet, StorageError> {
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let res = sqlx::query(
            r"
            INSERT INTO card_sets (owner, name, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
        )
        .bind(user_text(owner))
        .bind(name.as_str())
        .bind(description)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(CardSet::new(
            CardSetId::new(id),
            owner,
            name.clone(),
            description.map(str::to_owned),
            now,
            now,
        ))
    }

    async fn get_set(&self, id: CardSetId) -> Result<CardSet, StorageError> {
        let sql = format!("SELECT {SET_COLUMNS} FROM card_sets WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("set_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_set_row(&row)
    }

    async fn list_sets(&self, owner: UserId) -> Result<Vec<CardSetSummary>, StorageError> {
        let sql = format!(
            r"
            SELECT {SET_COLUMNS},
                (SELECT COUNT(*) FROM card_set_items i WHERE i.set_id = card_sets.id) AS card_count
            FROM card_sets
            WHERE owner = ?1
            ORDER BY created_at DESC, id DESC
            "
        );
        let rows = sqlx::query(&sql)
            .bind(user_text(owner))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter()
            .map(|row| {
                Ok(CardSetSummary {
                    set: map_set_row(row)?,
                    card_count: count_u32(row)?,
                })
            })
            .collect()
    }

    async fn delete_set(&self, id: CardSetId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM card_sets WHERE id = ?1")
            .bind(id_i64("set_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn add_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<CardSetItem, StorageError> {
        let set = id_i64("set_id", set_id.value())?;
        let card = card_id_i64(card_id)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        require_set(&mut tx, set).await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO card_set_items (set_id, card_id, added_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(set_id, card_id) DO NOTHING
            ",
        )
        .bind(set)
        .bind(card)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?
        .rows_affected();
        if inserted > 0 {
            touch_set(&mut tx, set, now).await?;
        }

        let row = sqlx::query(
            "SELECT added_at FROM card_set_items WHERE set_id = ?1 AND card_id = ?2",
        )
        .bind(set)
        .bind(card)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let added_at: DateTime<Utc> = row.try_get("added_at").map_err(ser)?;

        tx.commit().await.map_err(conn)?;
        Ok(CardSetItem {
            set_id,
            card_id,
            added_at,
        })
    }

    async fn remove_card(
        &self,
        set_id: CardSetId,
        card_id: CardId,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let set = id_i64("set_id", set_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        require_set(&mut tx, set).await?;

        let removed = sqlx::query("DELETE FROM card_set_items WHERE set_id = ?1 AND card_id = ?2")
            .bind(set)
            .bind(card_id_i64(card_id)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?
            .rows_affected();
        if removed > 0 {
            touch_set(&mut tx, set, now).await?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn list_cards_in_set(&self, set_id: CardSetId) -> Result<Vec<Card>, StorageError> {
        let set = id_i64("set_id", set_id.value())?;
        let mut db = self.pool.acquire().await.map_err(conn)?;
        require_set(&mut db, set).await?;

        let sql = format!(
            r"
            SELECT {CARD_COLUMNS}
            FROM card_set_items i
            JOIN cards c ON c.id = i.card_id
            WHERE i.set_id = ?1
            ORDER BY i.added_at ASC, c.id ASC
            "
        );
        let rows = sqlx::query(&sql)
            .bind(set)
            .fetch_all(&mut *db)
            .await
            .map_err(conn)?;
        rows.iter().map(map_card_row).collect()
    }

    async fn count_cards(&self, set_id: CardSetId) -> Result<u32, StorageError> {
        let set = id_i64("set_id", set_id.value())?;
        let mut db = self.pool.acquire().await.map_err(conn)?;
        require_set(&mut db, set).await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS card_count FROM card_set_items WHERE set_id = ?1",
        )
        .bind(set)
        .fetch_one(&mut *db)
        .await
        .map_err(conn)?;
        count_u32(&row)
    }
}
