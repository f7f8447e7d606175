pub mod auth;
pub mod chat;
pub mod db;
pub mod error;
pub mod users;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::auth::JwtVerifier;
use crate::chat::{ConnectionRegistry, PresenceTracker};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
    pub jwt: JwtVerifier,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, jwt_secret: &str) -> Self {
        let registry = ConnectionRegistry::default();
        let presence = PresenceTracker::new(db_pool.clone(), registry.clone());
        Self {
            db_pool,
            registry,
            presence,
            jwt: JwtVerifier::new(jwt_secret),
        }
    }
}
