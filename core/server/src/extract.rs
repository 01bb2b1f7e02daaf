use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};

use crate::error::AppError;

/// `Json` whose rejections use the API's error shape. Oversized bodies
/// keep their 413; every other rejection is a 400.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err(
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, rejection.body_text()),
            ),
            Err(rejection) => Err(AppError::bad_request(rejection.body_text())),
        }
    }
}
