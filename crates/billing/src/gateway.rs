//! Payment gateway client
//!
//! The reconciler and the checkout/portal services talk to the payment
//! gateway through the [`PaymentGateway`] trait so tests can swap in a mock.
//! The production implementation calls the Stripe REST API directly over
//! reqwest with form-encoded bodies.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{BillingError, BillingResult};

/// Metadata key linking a gateway customer back to a Copyspark user
pub const USER_ID_METADATA_KEY: &str = "userId";

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Stripe configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price ID of the Copyspark Pro plan
    pub price_id: String,
    /// Message shown on the hosted confirmation page after checkout
    pub payment_successful_text: String,
}

impl StripeConfig {
    pub fn from_config(config: &copyspark_shared::Config) -> Self {
        Self {
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            price_id: config.stripe_price_id.clone(),
            payment_successful_text: config.payment_successful_text.clone(),
        }
    }
}

/// A gateway customer, reduced to what the reconciler needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCustomer {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

impl GatewayCustomer {
    /// The Copyspark user this customer is linked to, if any
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get(USER_ID_METADATA_KEY).map(String::as_str)
    }
}

/// Outbound payment gateway operations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Retrieve a customer so the reconciler can recover the linked user id
    async fn get_customer(&self, customer_id: &str) -> BillingResult<GatewayCustomer>;

    /// Merge metadata into a customer record
    async fn update_customer_metadata(
        &self,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> BillingResult<()>;

    /// Create a payment link for the Pro plan, carrying the user id in the
    /// link metadata so the completed-checkout event can resolve the user
    async fn create_payment_link(&self, user_id: &str) -> BillingResult<String>;

    /// Create a billing-portal session for an existing customer
    async fn create_portal_session(&self, customer_id: &str) -> BillingResult<String>;
}

/// Production gateway over the Stripe REST API
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    base_url: String,
    config: StripeConfig,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    deleted: bool,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self::with_base_url(config, STRIPE_API_BASE)
    }

    /// Point the client at a different host (tests)
    pub fn with_base_url(config: StripeConfig, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    async fn get_json(&self, path: &str) -> BillingResult<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        Self::decode(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> BillingResult<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.config.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> BillingResult<serde_json::Value> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BillingError::Gateway(format!(
                "stripe returned {status}: {message}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| BillingError::Gateway(format!("invalid stripe response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn get_customer(&self, customer_id: &str) -> BillingResult<GatewayCustomer> {
        let raw = self.get_json(&format!("/v1/customers/{customer_id}")).await?;
        let customer: CustomerResponse = serde_json::from_value(raw)
            .map_err(|e| BillingError::Gateway(format!("invalid customer object: {e}")))?;

        if customer.deleted {
            return Err(BillingError::Gateway(format!(
                "customer {customer_id} has been deleted"
            )));
        }

        Ok(GatewayCustomer {
            id: customer.id,
            metadata: customer.metadata,
        })
    }

    async fn update_customer_metadata(
        &self,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> BillingResult<()> {
        let params: Vec<(String, String)> = metadata
            .into_iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value))
            .collect();

        self.post_form(&format!("/v1/customers/{customer_id}"), &params)
            .await?;

        tracing::debug!(customer_id, "Updated gateway customer metadata");
        Ok(())
    }

    async fn create_payment_link(&self, user_id: &str) -> BillingResult<String> {
        let params = vec![
            ("line_items[0][price]".to_string(), self.config.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("allow_promotion_codes".to_string(), "true".to_string()),
            (
                "after_completion[type]".to_string(),
                "hosted_confirmation".to_string(),
            ),
            (
                "after_completion[hosted_confirmation][custom_message]".to_string(),
                self.config.payment_successful_text.clone(),
            ),
            (
                format!("metadata[{USER_ID_METADATA_KEY}]"),
                user_id.to_string(),
            ),
        ];

        let raw = self.post_form("/v1/payment_links", &params).await?;
        let link: UrlResponse = serde_json::from_value(raw)
            .map_err(|e| BillingError::Gateway(format!("invalid payment link object: {e}")))?;

        tracing::info!(user_id, "Created payment link");
        Ok(link.url)
    }

    async fn create_portal_session(&self, customer_id: &str) -> BillingResult<String> {
        let params = vec![("customer".to_string(), customer_id.to_string())];

        let raw = self.post_form("/v1/billing_portal/sessions", &params).await?;
        let session: UrlResponse = serde_json::from_value(raw)
            .map_err(|e| BillingError::Gateway(format!("invalid portal session object: {e}")))?;

        tracing::info!(customer_id, "Created customer portal session");
        Ok(session.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn test_config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".into(),
            webhook_secret: "whsec_test".into(),
            price_id: "price_pro_monthly".into(),
            payment_successful_text: "Thanks for upgrading!".into(),
        }
    }

    #[tokio::test]
    async fn get_customer_returns_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/customers/cus_1")
            .with_status(200)
            .with_body(
                json!({
                    "id": "cus_1",
                    "object": "customer",
                    "metadata": { "userId": "u1" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let gateway = StripeGateway::with_base_url(test_config(), &server.url());
        let customer = gateway.get_customer("cus_1").await.unwrap();

        assert_eq!(customer.id, "cus_1");
        assert_eq!(customer.user_id(), Some("u1"));
    }

    #[tokio::test]
    async fn deleted_customer_is_a_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/customers/cus_gone")
            .with_status(200)
            .with_body(json!({ "id": "cus_gone", "deleted": true }).to_string())
            .create_async()
            .await;

        let gateway = StripeGateway::with_base_url(test_config(), &server.url());
        let err = gateway.get_customer("cus_gone").await.unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
    }

    #[tokio::test]
    async fn create_payment_link_sends_price_and_user_metadata() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payment_links")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("line_items[0][price]".into(), "price_pro_monthly".into()),
                Matcher::UrlEncoded("line_items[0][quantity]".into(), "1".into()),
                Matcher::UrlEncoded("allow_promotion_codes".into(), "true".into()),
                Matcher::UrlEncoded("metadata[userId]".into(), "u1".into()),
            ]))
            .with_status(200)
            .with_body(json!({ "id": "plink_1", "url": "https://buy.stripe.com/x" }).to_string())
            .create_async()
            .await;

        let gateway = StripeGateway::with_base_url(test_config(), &server.url());
        let url = gateway.create_payment_link("u1").await.unwrap();

        assert_eq!(url, "https://buy.stripe.com/x");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_surface_the_stripe_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/billing_portal/sessions")
            .with_status(400)
            .with_body(json!({ "error": { "message": "No such customer" } }).to_string())
            .create_async()
            .await;

        let gateway = StripeGateway::with_base_url(test_config(), &server.url());
        let err = gateway.create_portal_session("cus_nope").await.unwrap_err();

        match err {
            BillingError::Gateway(message) => assert!(message.contains("No such customer")),
            other => panic!("expected gateway error, got {other:?}"),
        }
    }
}
