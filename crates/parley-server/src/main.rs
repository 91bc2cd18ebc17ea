mod config;
mod sweep;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::state::AppStateInner;
use parley_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    if let Some(sweep) = config.orphan_sweep {
        info!(
            "Orphan sweep every {}s (grace {}s)",
            sweep.interval_secs, sweep.grace_secs
        );
        tokio::spawn(sweep::run_orphan_sweep(Arc::clone(&db), sweep));
    }

    info!(
        "Store deadline {}ms, coalesce ceiling {}ms",
        config.resolver.store_deadline.as_millis(),
        config.resolver.coalesce_ceiling.as_millis()
    );
    let state = AppStateInner::new(db, config.resolver, config.jwt_secret);

    let app = parley_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
