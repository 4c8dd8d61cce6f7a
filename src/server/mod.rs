//! chatterd server: REST API + WebSocket push, state in SQLite.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod presence;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;

use crate::storage::{db_path, Storage};

use config::{Cli, Config};
use presence::Presence;
use state::{AppState, ServerState};

/// Entry point: parse CLI, open storage, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::tlog!("chatterd starting");
    crate::tlog!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");
    let db = db_path(&config.data_dir);
    let storage = Storage::open(&db).expect("failed to open database");
    crate::tlog!("  database: {}", db.display());

    let jwt_secret = config.jwt_secret.unwrap_or_else(|| {
        crate::tlog!("  WARNING: no JWT secret configured, using a random one");
        crate::tlog!("  Existing tokens will stop working on every restart.");
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    });

    let state = ServerState {
        shared: Arc::new(Mutex::new(AppState {
            storage,
            jwt_secret,
        })),
        presence: Arc::new(Presence::new()),
    };

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::tlog!("chatterd listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
