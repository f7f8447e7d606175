//! Wire protocol for the relay: every frame is a JSON object carrying a
//! `type` discriminator. Field names are camelCase, matching the REST API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::store::{ConversationView, MessageView};
use crate::users::PublicUser;

/// Inbound frames. Unknown `type` values decode to `Unknown` so new client
/// versions can speak to old servers without tripping errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Auth { token: String },
    Ping,
    GetConversations,
    GetMessages { conversation_id: Uuid },
    GetConversation { other_user_id: Uuid },
    SendMessage { receiver_id: Uuid, content: String },
    StartConversation { receiver_id: Uuid },
    GetUsers,
    SetStatus { is_online: bool },
    #[serde(other)]
    Unknown,
}

/// Outbound frames, serialized inside an [`Outbound`] envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Welcome {
        message: String,
    },
    AuthSuccess {
        user_id: String,
    },
    AuthError {
        error: String,
    },
    Pong {
        timestamp: i64,
    },
    Conversations {
        conversations: Vec<ConversationView>,
    },
    Messages {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        messages: Vec<MessageView>,
    },
    MessageSent {
        message: MessageView,
        conversation_id: String,
    },
    NewMessage {
        message: MessageView,
        conversation_id: String,
    },
    Users {
        users: Vec<PublicUser>,
    },
    ConversationStarted {
        conversation: ConversationView,
    },
    StatusUpdated {
        is_online: bool,
    },
    UserStatusChange {
        user_id: String,
        is_online: bool,
        last_seen: i64,
    },
    Error {
        error: String,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::AuthSuccess { .. } => "auth_success",
            ServerEvent::AuthError { .. } => "auth_error",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::Conversations { .. } => "conversations",
            ServerEvent::Messages { .. } => "messages",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::Users { .. } => "users",
            ServerEvent::ConversationStarted { .. } => "conversation_started",
            ServerEvent::StatusUpdated { .. } => "status_updated",
            ServerEvent::UserStatusChange { .. } => "user_status_change",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Envelope adding the per-event correlation token clients use for
/// deduplication and tracing.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

impl Outbound {
    pub fn new(event: ServerEvent) -> Self {
        let message_id = format!("{}-{}", event.kind(), Uuid::now_v7());
        Self { event, message_id }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("event serialization")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_events() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Auth { token } if token == "abc"));

        let receiver = Uuid::now_v7();
        let raw = format!(
            r#"{{"type":"send_message","receiverId":"{receiver}","content":"hi"}}"#
        );
        let event: ClientEvent = serde_json::from_str(&raw).unwrap();
        assert!(
            matches!(event, ClientEvent::SendMessage { receiver_id, ref content }
                if receiver_id == receiver && content == "hi")
        );
    }

    #[test]
    fn unknown_type_is_ignored_not_an_error() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"typing_indicator","to":"x"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Unknown));
    }

    #[test]
    fn outbound_envelope_carries_correlation_token() {
        let frame = Outbound::new(ServerEvent::Pong { timestamp: 42 });
        let value: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["type"], "pong");
        assert_eq!(value["timestamp"], 42);
        assert!(value["messageId"].as_str().unwrap().starts_with("pong-"));
    }

    #[test]
    fn empty_conversation_reply_omits_conversation_id() {
        let frame = Outbound::new(ServerEvent::Messages {
            conversation_id: None,
            messages: vec![],
        });
        let value: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["type"], "messages");
        assert!(value.get("conversationId").is_none());
    }
}
