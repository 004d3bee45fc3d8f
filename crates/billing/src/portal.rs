//! Customer portal sessions
//!
//! Pro users manage their subscription (cancel, reactivate, change card)
//! through the gateway's hosted portal. The resulting changes come back to
//! us as customer.subscription.* webhook events; the portal itself never
//! touches our store.

use std::sync::Arc;

use crate::error::BillingResult;
use crate::gateway::PaymentGateway;

pub struct PortalService {
    gateway: Arc<dyn PaymentGateway>,
}

impl PortalService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Create a short-lived portal session URL for an existing customer
    pub async fn create_portal_session(&self, customer_id: &str) -> BillingResult<String> {
        let url = self.gateway.create_portal_session(customer_id).await?;
        tracing::info!(customer_id, "Issued portal session");
        Ok(url)
    }
}
