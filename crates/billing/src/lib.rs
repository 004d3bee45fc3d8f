// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Copyspark Billing Module
//!
//! Handles Stripe integration for the Copyspark subscription lifecycle.
//!
//! ## Features
//!
//! - **Webhooks**: Verify and reconcile gateway events (checkout completed,
//!   subscription updated, subscription deleted)
//! - **Payment Links**: Hosted checkout URLs for the Pro plan
//! - **Customer Portal**: Hosted subscription management sessions
//! - **Copy Quota**: Lifetime generation budget for Free users

pub mod checkout;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod portal;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing;

// Checkout
pub use checkout::CheckoutService;

// Entitlement
pub use entitlement::{CopyAllowance, CopyQuotaService};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{EventData, EventKind, PlanStatus, SubscriptionChange, WebhookEvent};

// Gateway
pub use gateway::{
    GatewayCustomer, PaymentGateway, StripeConfig, StripeGateway, USER_ID_METADATA_KEY,
};

// Ledger
pub use ledger::{FirestoreLedger, LedgerStore, PaymentRecord, UserPatch, UserRecord};

// Portal
pub use portal::PortalService;

// Webhooks
pub use webhooks::WebhookHandler;

use std::sync::Arc;

use copyspark_shared::{Config, FirestoreClient};

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub quota: CopyQuotaService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Wire the production gateway and ledger from application config
    pub fn new(config: &Config) -> Self {
        let stripe_config = StripeConfig::from_config(config);
        let webhook_secret = stripe_config.webhook_secret.clone();

        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(stripe_config));
        let ledger: Arc<dyn LedgerStore> = Arc::new(FirestoreLedger::new(FirestoreClient::new(
            &config.firestore_base_url,
            &config.firestore_project_id,
            &config.firestore_access_token,
        )));

        Self::with_parts(gateway, ledger, webhook_secret, config.max_free_copy_generations)
    }

    /// Assemble the service from explicit gateway and ledger implementations
    pub fn with_parts(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn LedgerStore>,
        webhook_secret: impl Into<String>,
        max_free_copy_generations: i64,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(gateway.clone()),
            portal: PortalService::new(gateway.clone()),
            quota: CopyQuotaService::new(ledger.clone(), max_free_copy_generations),
            webhooks: WebhookHandler::new(gateway, ledger, webhook_secret),
        }
    }
}
