// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RFID Push Gateway Service
//!
//! HTTP backend that registers device push tokens, forwards RFID scans to
//! their owners as FCM notifications and lets an operator broadcast to
//! every registered device.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `DATABASE_PATH`: `memory` or a RocksDB directory (default: memory)
//! - `ALLOWED_ORIGINS`: CORS origins, comma separated (default: *)
//! - `RATE_LIMIT_SCAN_MAX` / `RATE_LIMIT_SCAN_WINDOW_MS`: scan policy (20 / 60000)
//! - `RATE_LIMIT_DEFAULT_MAX` / `RATE_LIMIT_DEFAULT_WINDOW_MS`: other routes (10 / 60000)
//! - `DISPATCH_CONCURRENCY`: broadcast sends in flight (default: 1)
//! - `FIREBASE_PROJECT_ID`, `FIREBASE_CLIENT_EMAIL`, `FIREBASE_PRIVATE_KEY`:
//!   FCM service account; without them messages are only logged

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rfid_push_gateway::{
    config::Config,
    handlers::{router, AppState},
    store::SurrealStore,
    transport::{DeliveryTransport, DryRunTransport, FcmTransport},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        database = %config.database_path,
        scan_limit = config.rate_limit.scan.max_requests,
        default_limit = config.rate_limit.default.max_requests,
        concurrency = config.dispatch.concurrency,
        "Starting RFID push gateway"
    );

    let store = Arc::new(SurrealStore::connect(&config.database_path).await?);
    info!("Connected to SurrealDB");

    let transport: Arc<dyn DeliveryTransport> = match &config.fcm {
        Some(fcm) => {
            info!(project = %fcm.project_id, "Using FCM transport");
            Arc::new(FcmTransport::new(fcm.clone())?)
        }
        None => {
            warn!("FIREBASE_* credentials not set, notifications will only be logged");
            Arc::new(DryRunTransport::new())
        }
    };

    let cleanup_interval = config.rate_limit.cleanup_interval();
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, store, transport)?);

    // Spawn cleanup task
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let evicted = cleanup_state.limiter.cleanup().await;
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted expired rate windows");
            }
        }
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
