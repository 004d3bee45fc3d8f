//! Application state

use std::sync::Arc;

use copyspark_billing::BillingService;
use copyspark_shared::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let billing = Arc::new(BillingService::new(&config));
        tracing::info!("Stripe billing service initialized");

        Self { config, billing }
    }
}
