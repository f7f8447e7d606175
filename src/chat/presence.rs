//! Online/offline state derived from registry transitions.
//!
//! The registry's connection sets are authoritative for who is reachable;
//! the persisted flag and the `user_status_change` broadcast follow them.
//! Every transition for a user runs under that user's lock and re-checks the
//! registry after acquiring it, so racing connects and disconnects settle on
//! the true state and each real edge broadcasts exactly once.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::chat::event::{Outbound, ServerEvent};
use crate::chat::registry::ConnectionRegistry;
use crate::db;
use crate::error::RelayError;
use crate::users;

#[derive(Clone)]
pub struct PresenceTracker {
    pool: SqlitePool,
    registry: ConnectionRegistry,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PresenceTracker {
    pub fn new(pool: SqlitePool, registry: ConnectionRegistry) -> Self {
        Self {
            pool,
            registry,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_default().clone()
    }

    /// Called after a connection registers. No-op when the user was already
    /// online (another session active) or the connection is already gone.
    pub async fn mark_online_if_needed(&self, user_id: Uuid) -> Result<(), RelayError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if self.registry.session_count(user_id) == 0 {
            // lost a race with a disconnect; the offline path owns the truth
            return Ok(());
        }
        let Some(was_online) = users::is_online(&self.pool, user_id).await? else {
            warn!(%user_id, "presence update for unknown user");
            return Ok(());
        };
        if was_online {
            return Ok(());
        }
        let now = db::now_ms();
        users::set_presence(&self.pool, user_id, true, now).await?;
        self.broadcast_status(user_id, true, now);
        Ok(())
    }

    /// Called when the registry reports a user's live set became empty.
    pub async fn mark_offline(&self, user_id: Uuid) -> Result<(), RelayError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if self.registry.session_count(user_id) > 0 {
            // a new session registered before we got here; still online
            return Ok(());
        }
        match users::is_online(&self.pool, user_id).await? {
            Some(true) => {}
            _ => return Ok(()),
        }
        let now = db::now_ms();
        users::set_presence(&self.pool, user_id, false, now).await?;
        self.broadcast_status(user_id, false, now);
        Ok(())
    }

    /// Client-requested override: persists and broadcasts unconditionally,
    /// bypassing the edge guard used for connect/disconnect.
    pub async fn set_manual_status(&self, user_id: Uuid, online: bool) -> Result<(), RelayError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = db::now_ms();
        users::set_presence(&self.pool, user_id, online, now).await?;
        self.broadcast_status(user_id, online, now);
        Ok(())
    }

    fn broadcast_status(&self, user_id: Uuid, online: bool, last_seen: i64) {
        let frame = Outbound::new(ServerEvent::UserStatusChange {
            user_id: user_id.to_string(),
            is_online: online,
            last_seen,
        })
        .to_json();
        self.registry.broadcast_to_all_except(user_id, &frame);
    }
}
