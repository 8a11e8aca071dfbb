//! Backend for the NetWalking community events site.
//!
//! Serves the public events calendar from a flat JSON file and an ordered,
//! cached image gallery per event backed by a hosted media store. Admin
//! mutations (upload, delete, reorder) are gated behind a single-slot
//! session cookie.
//!
//!
//!
//! # General Infrastructure
//! - One axum process, one upstream collaborator (the media store)
//! - Event metadata is a flat JSON file read at startup; images live in the
//!   store under `events/{no}/`
//! - Display order is encoded as `order_<n>` tags on the store objects and
//!   derived server-side on every fetch
//! - Galleries are cached in-process for 24h; any admin mutation drops the
//!   entry so the next read hits the store again
//! - When the store rate-limits us, reads degrade to the last cached value
//!   instead of a blank gallery
//!
//!
//!
//! # Setup
//!
//! Secrets (`CLOUDINARY_API_SECRET`, `ADMIN_PASSWORD_HASH`) are read from
//! `/run/secrets`; the rest is environment variables with logged defaults.
//!
//! ```sh
//! RUST_LOG=netwalk=debug cargo run
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header::CONTENT_TYPE},
    middleware,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod ordering;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;

use routes::{
    delete_image, get_event, get_event_images, list_events, login, logout, reorder_images,
    require_admin, upload_images,
};
use state::AppState;

/// Whole-request body ceiling; generous enough for a batch of 10 MiB files.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Builds the full router; shared by the server and the integration tests.
pub fn app(state: Arc<AppState>) -> Router {
    let images = Router::new()
        .route(
            "/events/{no}/images",
            get(get_event_images)
                .post(upload_images)
                .delete(delete_image),
        )
        .route("/events/{no}/images/reorder", post(reorder_images))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new()
        .route("/events", get(list_events))
        .route("/events/{no}", get(get_event))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .merge(images);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
