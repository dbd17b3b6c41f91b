mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use foodshare_api::storage::ImageStore;
use foodshare_api::{AppStateInner, build_router};
use foodshare_core::{MarketSettings, Marketplace};
use foodshare_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foodshare=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database and image storage
    let db = Database::open(&config.db_path)?;
    let images = ImageStore::new(config.upload_dir.clone()).await?;

    let market = Marketplace::new(
        db,
        MarketSettings {
            handover_ttl: chrono::Duration::hours(config.handover_ttl_hours),
        },
    );
    let state = Arc::new(AppStateInner {
        market,
        jwt_secret: config.jwt_secret.clone(),
        session_days: config.session_days,
        cookie_secure: config.cookie_secure,
        images,
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("FoodShare server listening on {}", addr);
    info!(
        "Sessions last {} days, handover codes {} hours",
        config.session_days, config.handover_ttl_hours
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
