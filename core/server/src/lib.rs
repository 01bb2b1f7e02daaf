//! HTTP API for InvoiceDrive.
//!
//! All routes live under `/api` and answer with JSON. Failures use the
//! shape `{"success": false, "error": "..."}`.

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiResult, AppError};
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
