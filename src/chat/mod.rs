pub mod event;
pub mod presence;
pub mod registry;
pub mod session;
pub mod store;

use axum::{routing::get, Router};

use crate::AppState;

pub use presence::PresenceTracker;
pub use registry::ConnectionRegistry;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(session::chat_ws))
}
