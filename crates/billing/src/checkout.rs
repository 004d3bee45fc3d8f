//! Payment link creation
//!
//! A payment link is a reusable hosted checkout URL for the Pro plan. The
//! user id travels in the link metadata so the resulting
//! checkout.session.completed event can be attributed without a customer
//! lookup.

use std::sync::Arc;

use crate::error::BillingResult;
use crate::gateway::PaymentGateway;

pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Create a hosted checkout URL for the given user
    pub async fn create_payment_link(&self, user_id: &str) -> BillingResult<String> {
        let url = self.gateway.create_payment_link(user_id).await?;
        tracing::info!(user_id, "Issued payment link");
        Ok(url)
    }
}
