//! HTTP routes

pub mod billing;
pub mod copy;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/billing/webhook", post(billing::stripe_webhook))
        .route("/billing/payment-link", post(billing::create_payment_link))
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/copy/allowance/{user_id}", get(copy::check_allowance))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
