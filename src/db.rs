use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        profile_image TEXT,
        user_type TEXT NOT NULL DEFAULT 'homeowner',
        is_online INTEGER NOT NULL DEFAULT 0,
        last_seen INTEGER
    )",
    // user_a/user_b hold the normalized pair (user_a < user_b), so the
    // UNIQUE constraint enforces one conversation per unordered pair.
    "CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        user_a TEXT NOT NULL REFERENCES users (id),
        user_b TEXT NOT NULL REFERENCES users (id),
        last_message_id TEXT,
        updated_at INTEGER NOT NULL,
        UNIQUE (user_a, user_b)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations (id),
        sender_id TEXT NOT NULL REFERENCES users (id),
        receiver_id TEXT NOT NULL REFERENCES users (id),
        content TEXT NOT NULL,
        read INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (conversation_id, created_at)",
];

pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(url)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Wall-clock unix milliseconds; every persisted timestamp uses this.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use uuid::Uuid;

    /// Single-connection in-memory pool; a second connection would see a
    /// different empty database.
    pub async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    pub async fn seed_user(pool: &SqlitePool, id: Uuid, first_name: &str) {
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, user_type) VALUES (?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(first_name)
        .bind("Tester")
        .bind(format!("{first_name}@example.com"))
        .bind("homeowner")
        .execute(pool)
        .await
        .unwrap();
    }
}
