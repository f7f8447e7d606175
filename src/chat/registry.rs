use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Frames queued per connection before the relay starts dropping. A slow
/// reader loses frames; it never stalls anyone else's handler.
pub const OUTBOUND_QUEUE: usize = 64;

/// Live connections per authenticated user. A user may hold any number of
/// simultaneous sessions (tabs, devices); the set size is their session
/// count. In-memory only: a restart means everyone starts out offline.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, HashMap<Uuid, mpsc::Sender<String>>>>>,
}

impl ConnectionRegistry {
    /// Returns true when this was the user's first live connection.
    pub fn register(&self, user_id: Uuid, conn_id: Uuid, tx: mpsc::Sender<String>) -> bool {
        let mut map = self.inner.lock().unwrap();
        let conns = map.entry(user_id).or_default();
        let first = conns.is_empty();
        conns.insert(conn_id, tx);
        first
    }

    /// Returns true when the user's live set became empty; the entry is
    /// dropped so the caller must follow up with a presence transition.
    pub fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut map = self.inner.lock().unwrap();
        let Some(conns) = map.get_mut(&user_id) else {
            return false;
        };
        conns.remove(&conn_id);
        if conns.is_empty() {
            map.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub fn session_count(&self, user_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Fan a frame out to every live connection of one user. A full queue
    /// drops the frame for that connection only; a closed channel means the
    /// session is already tearing down and is skipped without error.
    pub fn send_to_user(&self, user_id: Uuid, frame: &str) {
        let senders: Vec<(Uuid, mpsc::Sender<String>)> = {
            let map = self.inner.lock().unwrap();
            match map.get(&user_id) {
                Some(conns) => conns.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };
        for (conn_id, tx) in senders {
            match tx.try_send(frame.to_owned()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(%user_id, %conn_id, "outbound queue full, dropping frame");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%user_id, %conn_id, "connection already closed, skipping");
                }
            }
        }
    }

    pub fn broadcast_to_all_except(&self, user_id: Uuid, frame: &str) {
        let targets: Vec<Uuid> = {
            let map = self.inner.lock().unwrap();
            map.keys().filter(|id| **id != user_id).copied().collect()
        };
        for target in targets {
            self.send_to_user(target, frame);
        }
    }
}
