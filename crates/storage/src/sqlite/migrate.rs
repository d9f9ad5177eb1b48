use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Version 1: books, quotes and themes, the card catalog, personal sets and
/// the progress ledger with its attempt log.
const V1_SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        author TEXT
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS themes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        color TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS quotes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        text TEXT NOT NULL,
        source TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS quote_themes (
        quote_id INTEGER NOT NULL,
        theme_id INTEGER NOT NULL,
        PRIMARY KEY (quote_id, theme_id),
        FOREIGN KEY (quote_id) REFERENCES quotes(id) ON DELETE CASCADE,
        FOREIGN KEY (theme_id) REFERENCES themes(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS cards (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        quote_id INTEGER NOT NULL,
        card_text TEXT NOT NULL,
        missing_words TEXT NOT NULL,
        missing_positions TEXT NOT NULL,
        difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 5),
        is_active INTEGER NOT NULL DEFAULT 1,
        is_archived INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (quote_id) REFERENCES quotes(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS card_themes (
        card_id INTEGER NOT NULL,
        theme_id INTEGER NOT NULL,
        PRIMARY KEY (card_id, theme_id),
        FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE,
        FOREIGN KEY (theme_id) REFERENCES themes(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS card_sets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS card_set_items (
        set_id INTEGER NOT NULL,
        card_id INTEGER NOT NULL,
        added_at TEXT NOT NULL,
        PRIMARY KEY (set_id, card_id),
        FOREIGN KEY (set_id) REFERENCES card_sets(id) ON DELETE CASCADE,
        FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS card_progress (
        user_id TEXT NOT NULL,
        card_id INTEGER NOT NULL,
        attempts INTEGER NOT NULL CHECK (attempts >= 1),
        correct_attempts INTEGER NOT NULL CHECK (correct_attempts BETWEEN 0 AND attempts),
        last_attempt_at TEXT NOT NULL,
        next_review_at TEXT NOT NULL,
        ease_factor REAL NOT NULL CHECK (ease_factor > 0),
        interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
        PRIMARY KEY (user_id, card_id),
        FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        card_id INTEGER NOT NULL,
        is_correct INTEGER NOT NULL,
        answered_at TEXT NOT NULL,
        response_time_ms INTEGER CHECK (response_time_ms IS NULL OR response_time_ms >= 0),
        FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_quotes_book ON quotes(book_id, id);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_cards_quote ON cards(quote_id);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_cards_created ON cards(created_at, id);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_card_sets_owner ON card_sets(owner, created_at);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_progress_user_next_review
        ON card_progress(user_id, next_review_at);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_attempts_user_answered
        ON attempts(user_id, answered_at);
    ",
];

/// Applies pending schema versions, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    let versions: [(i64, &[&str]); 1] = [(1, V1_SCHEMA)];
    for (version, statements) in versions {
        if is_applied(pool, version).await? {
            continue;
        }
        let mut tx = pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
