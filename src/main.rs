use axum::{routing::get, Router};
use homeserve_relay::{chat, db, users, AppState};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("homeserve_relay=info")),
        )
        .init();

    let db_pool = db::connect(&dotenv::var("DATABASE_URL")?).await?;
    // the registry starts empty, so nobody is reachable yet
    users::reset_all_offline(&db_pool).await?;

    let jwt_secret = dotenv::var("JWT_SECRET")?;
    let app_state = AppState::new(db_pool, &jwt_secret);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(chat::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let port: u16 = dotenv::var("WS_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(8081);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}
