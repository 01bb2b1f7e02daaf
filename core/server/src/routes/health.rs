use axum::{extract::State, Json};
use chrono::Local;
use serde::Serialize;
use tracing::debug;

use invoicedrive_common::UserInfo;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub drive_connected: bool,
    pub authenticated_user: Option<UserInfo>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let drive_connected = state.drive.is_authenticated().await;

    let authenticated_user = if drive_connected {
        match state.drive.user_info().await {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("Health check could not fetch user: {}", e);
                None
            }
        }
    } else {
        None
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        drive_connected,
        authenticated_user,
    })
}

/// Either the account details or the reason they are unavailable.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CurrentUser {
    User(UserInfo),
    Unavailable { error: String },
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user_info: CurrentUser,
}

pub async fn current_user(State(state): State<AppState>) -> Json<CurrentUserResponse> {
    let user_info = match state.drive.user_info().await {
        Ok(user) => CurrentUser::User(user),
        Err(e) => CurrentUser::Unavailable {
            error: e.to_string(),
        },
    };

    Json(CurrentUserResponse {
        success: true,
        user_info,
    })
}
