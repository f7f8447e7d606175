//! Per-connection handler: `Unauthenticated -> Authenticated -> Closed`.
//!
//! One read loop per connection plus one writer task draining its bounded
//! outbound queue. Handlers only meet through the registry and the store;
//! every failure becomes a typed `error` frame to this connection alone and
//! never closes it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::event::{ClientEvent, Outbound, ServerEvent};
use crate::chat::registry::OUTBOUND_QUEUE;
use crate::chat::store;
use crate::db;
use crate::error::RelayError;
use crate::users;
use crate::AppState;

pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::now_v7();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(conn_id, tx);
    debug!(%conn_id, "client connected");
    session.push(ServerEvent::Welcome {
        message: "Connected to HomeServe WebSocket server".into(),
    });

    while let Some(Ok(frame)) = ws_receiver.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => session.handle(&state, event).await,
                Err(err) => {
                    debug!(%conn_id, %err, "undecodable frame");
                    session.push(ServerEvent::Error {
                        error: "Invalid message format".into(),
                    });
                }
            },
            Message::Close(_) => break,
            // axum answers protocol pings itself; binary frames are not
            // part of this protocol
            _ => {}
        }
    }

    session.finish(&state).await;
    writer.abort();
    debug!(%conn_id, "client disconnected");
}

pub struct Session {
    conn_id: Uuid,
    user_id: Option<Uuid>,
    tx: mpsc::Sender<String>,
}

impl Session {
    pub fn new(conn_id: Uuid, tx: mpsc::Sender<String>) -> Self {
        Self {
            conn_id,
            user_id: None,
            tx,
        }
    }

    /// Queue a reply on this connection. Same drop-newest policy as the
    /// registry fan-out: a full queue loses the frame, never blocks.
    fn push(&self, event: ServerEvent) {
        let frame = Outbound::new(event).to_json();
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %self.conn_id, "outbound queue full, dropping reply");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %self.conn_id, "connection gone, dropping reply");
            }
        }
    }

    fn require_auth(&self) -> Result<Uuid, RelayError> {
        self.user_id.ok_or(RelayError::NotAuthenticated)
    }

    pub async fn handle(&mut self, state: &AppState, event: ClientEvent) {
        if let Err(err) = self.dispatch(state, event).await {
            if let RelayError::Transient(ref cause) = err {
                warn!(conn_id = %self.conn_id, %cause, "store failure");
            }
            self.push(ServerEvent::Error {
                error: err.to_string(),
            });
        }
    }

    async fn dispatch(&mut self, state: &AppState, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::Auth { token } => self.handle_auth(state, &token).await,
            ClientEvent::Ping => {
                self.push(ServerEvent::Pong {
                    timestamp: db::now_ms(),
                });
                Ok(())
            }
            // forward compatibility: unrecognized types are silently ignored
            ClientEvent::Unknown => Ok(()),
            ClientEvent::GetConversations => {
                let me = self.require_auth()?;
                let conversations = store::list_conversations(&state.db_pool, me).await?;
                self.push(ServerEvent::Conversations { conversations });
                Ok(())
            }
            ClientEvent::GetMessages { conversation_id } => {
                let me = self.require_auth()?;
                let conversation_id = conversation_id.to_string();
                let messages = store::list_messages(&state.db_pool, &conversation_id, me).await?;
                self.push(ServerEvent::Messages {
                    conversation_id: Some(conversation_id),
                    messages,
                });
                Ok(())
            }
            ClientEvent::GetConversation { other_user_id } => {
                let me = self.require_auth()?;
                match store::find_conversation_between(&state.db_pool, me, other_user_id).await? {
                    None => self.push(ServerEvent::Messages {
                        conversation_id: None,
                        messages: Vec::new(),
                    }),
                    Some(row) => {
                        let messages = store::list_messages(&state.db_pool, &row.id, me).await?;
                        self.push(ServerEvent::Messages {
                            conversation_id: Some(row.id),
                            messages,
                        });
                    }
                }
                Ok(())
            }
            ClientEvent::SendMessage {
                receiver_id,
                content,
            } => {
                let me = self.require_auth()?;
                if !users::exists(&state.db_pool, receiver_id).await? {
                    return Err(RelayError::NotFound("Receiver"));
                }
                let conversation =
                    store::find_or_create_conversation(&state.db_pool, me, receiver_id).await?;
                let message =
                    store::append_message(&state.db_pool, &conversation.id, me, receiver_id, &content)
                        .await?;
                self.push(ServerEvent::MessageSent {
                    message: message.clone(),
                    conversation_id: conversation.id.clone(),
                });
                let frame = Outbound::new(ServerEvent::NewMessage {
                    message,
                    conversation_id: conversation.id,
                })
                .to_json();
                state.registry.send_to_user(receiver_id, &frame);
                Ok(())
            }
            ClientEvent::StartConversation { receiver_id } => {
                let me = self.require_auth()?;
                if !users::exists(&state.db_pool, receiver_id).await? {
                    return Err(RelayError::NotFound("Receiver"));
                }
                let row =
                    store::find_or_create_conversation(&state.db_pool, me, receiver_id).await?;
                let conversation = store::conversation_view(&state.db_pool, row).await?;
                self.push(ServerEvent::ConversationStarted { conversation });
                Ok(())
            }
            ClientEvent::GetUsers => {
                let me = self.require_auth()?;
                let users = users::list_except(&state.db_pool, me).await?;
                self.push(ServerEvent::Users { users });
                Ok(())
            }
            ClientEvent::SetStatus { is_online } => {
                let me = self.require_auth()?;
                state.presence.set_manual_status(me, is_online).await?;
                self.push(ServerEvent::StatusUpdated { is_online });
                Ok(())
            }
        }
    }

    /// `auth` is the only state transition a client can drive. Failure
    /// leaves the connection open and unauthenticated; the client may retry.
    async fn handle_auth(&mut self, state: &AppState, token: &str) -> Result<(), RelayError> {
        let claims = match state.jwt.verify(token) {
            Ok(claims) => claims,
            Err(_) => {
                self.push(ServerEvent::AuthError {
                    error: "Invalid token".into(),
                });
                return Ok(());
            }
        };
        if !users::exists(&state.db_pool, claims.user_id).await? {
            self.push(ServerEvent::AuthError {
                error: "User not found".into(),
            });
            return Ok(());
        }

        // re-auth rebinds the connection: detach the old identity first
        if let Some(previous) = self.user_id.take() {
            if previous != claims.user_id
                && state.registry.unregister(previous, self.conn_id)
            {
                if let Err(err) = state.presence.mark_offline(previous).await {
                    warn!(user_id = %previous, %err, "presence update failed");
                }
            }
        }

        self.user_id = Some(claims.user_id);
        state
            .registry
            .register(claims.user_id, self.conn_id, self.tx.clone());
        info!(user_id = %claims.user_id, conn_id = %self.conn_id, "authenticated");
        self.push(ServerEvent::AuthSuccess {
            user_id: claims.user_id.to_string(),
        });
        if let Err(err) = state.presence.mark_online_if_needed(claims.user_id).await {
            // registry state is still the reachability truth; log and move on
            warn!(user_id = %claims.user_id, %err, "presence update failed");
        }
        Ok(())
    }

    /// Transport closed: release the registry entry and, when this was the
    /// user's last live connection, flip them offline.
    pub async fn finish(&mut self, state: &AppState) {
        if let Some(user_id) = self.user_id.take() {
            if state.registry.unregister(user_id, self.conn_id) {
                if let Err(err) = state.presence.mark_offline(user_id).await {
                    warn!(%user_id, %err, "presence update failed");
                }
            }
        }
    }
}
