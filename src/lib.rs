//! University DataHub backend.
//!
//! REST service over a relational catalog of universities, their programs,
//! grants and dormitories, with user accounts, favorites/comparison, and an
//! LLM-backed assistant on top of a vector store.
//!
//!
//!
//! # General Infrastructure
//! - Postgres holds the catalog and user data; the service talks to it
//!   through a lazily-connected pool
//! - Qdrant holds one collection of knowledge chunks rendered from the
//!   catalog; an admin endpoint rebuilds it from SQL
//! - Embeddings and chat completions go to an OpenAI-compatible endpoint;
//!   an external web-search API covers questions the collection cannot
//! - Everything is JSON over HTTP behind a CORS layer; auth is a bearer
//!   token issued by `/auth/login`
//!
//!
//!
//! # Notes
//!
//! ## Postgres + Qdrant
//! The vector collection is a derived view of the relational data, not a
//! second source of truth. It is rebuilt wholesale on sync rather than kept
//! in lockstep; stale answers between syncs are an accepted tradeoff, the
//! same way a search index lags its primary store.
use std::time::Duration;

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod ai;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod favorites;
pub mod llm;
pub mod models;
pub mod routes;
pub mod state;
pub mod vectors;
pub mod websearch;

use config::Config;
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new(Config::load()).expect("Failed to initialize state");

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any)
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
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
