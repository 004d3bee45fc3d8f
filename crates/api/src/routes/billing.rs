//! Billing routes
//!
//! The webhook endpoint is the only route Stripe calls; the payment-link
//! and portal routes are called by the Copyspark frontend.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use copyspark_billing::BillingError;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentLinkRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub customer_id: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

/// Inbound Stripe webhook deliveries
///
/// The body must reach verification as the exact raw bytes Stripe signed,
/// so this handler takes `Bytes` and never a JSON extractor.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(BillingError::SignatureInvalid)?;

    state.billing.webhooks.handle_webhook(&body, signature).await?;
    Ok(StatusCode::OK)
}

pub async fn create_payment_link(
    State(state): State<AppState>,
    Json(request): Json<PaymentLinkRequest>,
) -> ApiResult<Json<UrlResponse>> {
    let url = state
        .billing
        .checkout
        .create_payment_link(&request.user_id)
        .await?;
    Ok(Json(UrlResponse { url }))
}

pub async fn create_portal_session(
    State(state): State<AppState>,
    Json(request): Json<PortalRequest>,
) -> ApiResult<Json<UrlResponse>> {
    let url = state
        .billing
        .portal
        .create_portal_session(&request.customer_id)
        .await?;
    Ok(Json(UrlResponse { url }))
}
