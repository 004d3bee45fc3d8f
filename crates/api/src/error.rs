//! API error handling
//!
//! Webhook deliveries get a blunt contract: any failure, signature or
//! otherwise, is a 500 so the gateway redelivers. Details go to the logs,
//! never to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use copyspark_billing::BillingError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");

        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = Json(json!({ "error": "internal server error" }));
        (status, body).into_response()
    }
}
