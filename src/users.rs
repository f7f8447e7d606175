//! Read access to the user directory's public display fields, plus the two
//! columns the relay owns: `is_online` and `last_seen`.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Public projection of a directory entry: what other users get to see.
/// Email and role internals stay off the wire.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,
    pub user_type: String,
    pub is_online: bool,
    pub last_seen: Option<i64>,
}

/// Sender attribution attached to echoed messages.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserDisplay {
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,
}

const PUBLIC_COLUMNS: &str =
    "id, first_name, last_name, profile_image, user_type, is_online, last_seen";

pub async fn exists(pool: &SqlitePool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query_as::<_, (i64,)>("SELECT 1 FROM users WHERE id=?")
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub async fn public_user(pool: &SqlitePool, user_id: &str) -> Result<Option<PublicUser>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE id=?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Everyone except the requester, the projection `get_users` returns.
pub async fn list_except(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<PublicUser>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE id != ? ORDER BY first_name, last_name"
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await
}

pub async fn display(pool: &SqlitePool, user_id: &str) -> Result<UserDisplay, sqlx::Error> {
    sqlx::query_as("SELECT first_name, last_name, profile_image FROM users WHERE id=?")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn is_online(pool: &SqlitePool, user_id: Uuid) -> Result<Option<bool>, sqlx::Error> {
    Ok(
        sqlx::query_as::<_, (bool,)>("SELECT is_online FROM users WHERE id=?")
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?
            .map(|(flag,)| flag),
    )
}

pub async fn set_presence(
    pool: &SqlitePool,
    user_id: Uuid,
    online: bool,
    last_seen_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET is_online=?, last_seen=? WHERE id=?")
        .bind(online)
        .bind(last_seen_ms)
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Startup sweep: the registry is empty after a restart, so nobody is
/// reachable no matter what the rows said when the process died.
pub async fn reset_all_offline(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET is_online=0").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    #[tokio::test]
    async fn list_except_skips_requester_and_orders_by_name() {
        let pool = testing::pool().await;
        let me = Uuid::now_v7();
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        testing::seed_user(&pool, me, "Zoe").await;
        testing::seed_user(&pool, bob, "Bob").await;
        testing::seed_user(&pool, alice, "Alice").await;

        let others = list_except(&pool, me).await.unwrap();
        let names: Vec<&str> = others.iter().map(|u| u.first_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert!(others.iter().all(|u| u.id != me.to_string()));
    }

    #[tokio::test]
    async fn presence_round_trip() {
        let pool = testing::pool().await;
        let user = Uuid::now_v7();
        testing::seed_user(&pool, user, "Pat").await;

        assert_eq!(is_online(&pool, user).await.unwrap(), Some(false));
        set_presence(&pool, user, true, 1234).await.unwrap();
        assert_eq!(is_online(&pool, user).await.unwrap(), Some(true));
        let row = public_user(&pool, &user.to_string()).await.unwrap().unwrap();
        assert_eq!(row.last_seen, Some(1234));

        reset_all_offline(&pool).await.unwrap();
        assert_eq!(is_online(&pool, user).await.unwrap(), Some(false));
    }
}
