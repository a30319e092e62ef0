mod handlers;
mod state;

pub use state::{AdminGate, AppState};

use axum::routing::{get, post};
use axum::Router;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::notify::StderrSink;
use crate::proxy::{ResilienceProxy, UreqTransport};
use crate::retry::RetryOrchestrator;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/search", get(handlers::search))
        .route("/api/locate", get(handlers::locate))
        .route("/api/proxy/health", get(handlers::proxy_health))
        .route("/api/proxy/cache", get(handlers::proxy_cache))
        .route("/api/proxy/cache/clear", post(handlers::proxy_cache_clear))
        .route("/api/proxy/errors", get(handlers::proxy_errors))
        .route("/api/admin/credential", post(handlers::set_credential))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, admin_token: Option<String>) {
    let config = Config::load();
    let proxy = ResilienceProxy::new(Box::new(UreqTransport));
    proxy.set_credential(config.place_index_key());

    let state = Arc::new(AppState {
        proxy: Arc::new(proxy),
        retry: RetryOrchestrator::new(Arc::new(StderrSink)),
        config: Mutex::new(config),
        admin: AdminGate::new(admin_token),
        sink: Arc::new(StderrSink),
    });

    if !state.proxy.credential_set() {
        eprintln!("  Warning: no place-index key configured; one provider will stay silent.");
    }

    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Cannot bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    eprintln!("  Halal Compass server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {}", e);
            std::process::exit(1);
        });
}
