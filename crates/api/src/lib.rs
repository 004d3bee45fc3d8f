// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Copyspark API Library
//!
//! This crate contains the HTTP server components for the Copyspark
//! billing backend.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use copyspark_shared::Config;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Config {
            bind_addr: "127.0.0.1:0".into(),
            stripe_secret_key: "sk_test_123".into(),
            stripe_webhook_secret: "whsec_test".into(),
            stripe_price_id: "price_test".into(),
            payment_successful_text: "Thanks!".into(),
            firestore_project_id: "test-project".into(),
            firestore_access_token: "token".into(),
            firestore_base_url: "http://127.0.0.1:1".into(),
            max_free_copy_generations: 3,
        })
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_without_signature_header_is_a_server_error() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/billing/webhook")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn webhook_with_garbage_signature_is_a_server_error() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/billing/webhook")
                    .header("stripe-signature", "t=1,v1=deadbeef")
                    .body(Body::from(r#"{"id":"evt_1","type":"x","data":{"object":{}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
