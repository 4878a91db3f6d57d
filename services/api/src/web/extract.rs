//! services/api/src/web/extract.rs
//!
//! Request extractors whose rejections render through [`ApiError`], so a body
//! axum cannot decode still gets the usual `{"message": ...}` response.

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, FromRequest, Request,
    },
    Json,
};
use tracing::debug;

use crate::error::ApiError;

/// `Json<T>` with an [`ApiError`] rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "Rejected JSON body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body",
            _ => "Malformed JSON request body",
        };
        ApiError::Validation(message.to_string())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        debug!("Rejected multipart request: {}", rejection.body_text());
        ApiError::Validation("Malformed multipart request".to_string())
    }
}
