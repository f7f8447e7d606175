//! Conversation and message persistence. A conversation is the unique row
//! for an unordered pair of users; messages are append-only apart from the
//! read flag.

use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::error::RelayError;
use crate::users::{self, PublicUser, UserDisplay};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub last_message_id: Option<String>,
    pub updated_at: i64,
}

/// Conversation enriched with participant display info and its last message,
/// the shape `get_conversations` and `conversation_started` put on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub participants: Vec<PublicUser>,
    pub last_message: Option<LastMessage>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: i64,
}

/// Stored message joined with sender attribution for immediate echo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: i64,
    pub sender: UserDisplay,
}

/// Unordered pair, normalized so (a,b) and (b,a) hit the same row.
fn normalize_pair(a: Uuid, b: Uuid) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

pub async fn find_conversation_between(
    pool: &SqlitePool,
    a: Uuid,
    b: Uuid,
) -> Result<Option<ConversationRow>, RelayError> {
    let (user_a, user_b) = normalize_pair(a, b);
    let row = sqlx::query_as(
        "SELECT id, user_a, user_b, last_message_id, updated_at
         FROM conversations WHERE user_a=? AND user_b=?",
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Lookup-or-insert on the normalized pair. Two racing first messages both
/// insert with conflict-ignore and re-read, so exactly one row survives.
pub async fn find_or_create_conversation(
    pool: &SqlitePool,
    a: Uuid,
    b: Uuid,
) -> Result<ConversationRow, RelayError> {
    if a == b {
        return Err(RelayError::Validation(
            "Cannot start a conversation with yourself".into(),
        ));
    }
    if let Some(row) = find_conversation_between(pool, a, b).await? {
        return Ok(row);
    }
    let (user_a, user_b) = normalize_pair(a, b);
    sqlx::query(
        "INSERT INTO conversations (id, user_a, user_b, updated_at) VALUES (?,?,?,?)
         ON CONFLICT (user_a, user_b) DO NOTHING",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(user_a)
    .bind(user_b)
    .bind(db::now_ms())
    .execute(pool)
    .await?;
    match find_conversation_between(pool, a, b).await? {
        Some(row) => Ok(row),
        None => Err(RelayError::NotFound("conversation")),
    }
}

/// Appends a message and bumps the parent's last-message reference and
/// activity timestamp. Content must be non-empty after trimming.
pub async fn append_message(
    pool: &SqlitePool,
    conversation_id: &str,
    sender: Uuid,
    receiver: Uuid,
    content: &str,
) -> Result<MessageView, RelayError> {
    if content.trim().is_empty() {
        return Err(RelayError::Validation(
            "Message content cannot be empty".into(),
        ));
    }
    let id = Uuid::now_v7().to_string();
    let now = db::now_ms();
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, read, created_at)
         VALUES (?,?,?,?,?,0,?)",
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(sender.to_string())
    .bind(receiver.to_string())
    .bind(content)
    .bind(now)
    .execute(pool)
    .await?;
    sqlx::query("UPDATE conversations SET last_message_id=?, updated_at=? WHERE id=?")
        .bind(&id)
        .bind(now)
        .bind(conversation_id)
        .execute(pool)
        .await?;

    let sender_info = users::display(pool, &sender.to_string()).await?;
    Ok(MessageView {
        id,
        conversation_id: conversation_id.to_owned(),
        sender_id: sender.to_string(),
        receiver_id: receiver.to_string(),
        content: content.to_owned(),
        read: false,
        created_at: now,
        sender: sender_info,
    })
}

/// All conversations the user participates in, most recent activity first.
pub async fn list_conversations(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Vec<ConversationView>, RelayError> {
    let rows: Vec<ConversationRow> = sqlx::query_as(
        "SELECT id, user_a, user_b, last_message_id, updated_at
         FROM conversations WHERE user_a=? OR user_b=?
         ORDER BY updated_at DESC",
    )
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(conversation_view(pool, row).await?);
    }
    Ok(views)
}

pub async fn conversation_view(
    pool: &SqlitePool,
    row: ConversationRow,
) -> Result<ConversationView, RelayError> {
    let mut participants = Vec::with_capacity(2);
    for participant_id in [&row.user_a, &row.user_b] {
        if let Some(user) = users::public_user(pool, participant_id).await? {
            participants.push(user);
        }
    }
    let last_message = match &row.last_message_id {
        Some(message_id) => {
            sqlx::query_as(
                "SELECT id, sender_id, content, read, created_at FROM messages WHERE id=?",
            )
            .bind(message_id)
            .fetch_optional(pool)
            .await?
        }
        None => None,
    };
    Ok(ConversationView {
        id: row.id,
        participants,
        last_message,
        updated_at: row.updated_at,
    })
}

/// Full history in creation order, access-checked against the participant
/// pair. Afterwards the requester's unread incoming messages flip to read;
/// the returned snapshot still shows the pre-fetch flags.
pub async fn list_messages(
    pool: &SqlitePool,
    conversation_id: &str,
    requester: Uuid,
) -> Result<Vec<MessageView>, RelayError> {
    let pair: Option<(String, String)> =
        sqlx::query_as("SELECT user_a, user_b FROM conversations WHERE id=?")
            .bind(conversation_id)
            .fetch_optional(pool)
            .await?;
    let Some((user_a, user_b)) = pair else {
        return Err(RelayError::NotFound("conversation"));
    };
    let requester_id = requester.to_string();
    if requester_id != user_a && requester_id != user_b {
        return Err(RelayError::AccessDenied);
    }

    type MessageTuple = (
        String,
        String,
        String,
        String,
        String,
        bool,
        i64,
        String,
        String,
        Option<String>,
    );
    let rows: Vec<MessageTuple> = sqlx::query_as(
        "SELECT m.id, m.conversation_id, m.sender_id, m.receiver_id, m.content,
                m.read, m.created_at, u.first_name, u.last_name, u.profile_image
         FROM messages m JOIN users u ON u.id = m.sender_id
         WHERE m.conversation_id=?
         ORDER BY m.created_at ASC, m.id ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    let messages = rows
        .into_iter()
        .map(
            |(
                id,
                conversation_id,
                sender_id,
                receiver_id,
                content,
                read,
                created_at,
                first_name,
                last_name,
                profile_image,
            )| MessageView {
                id,
                conversation_id,
                sender_id,
                receiver_id,
                content,
                read,
                created_at,
                sender: UserDisplay {
                    first_name,
                    last_name,
                    profile_image,
                },
            },
        )
        .collect();

    sqlx::query("UPDATE messages SET read=1 WHERE conversation_id=? AND receiver_id=? AND read=0")
        .bind(conversation_id)
        .bind(&requester_id)
        .execute(pool)
        .await?;

    Ok(messages)
}
