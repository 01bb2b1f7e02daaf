mod drive;
pub mod health;
mod invoices;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/current-user", get(health::current_user))
        .merge(drive::router())
        .merge(invoices::router())
}
