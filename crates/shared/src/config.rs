//! Application configuration
//!
//! All configuration comes from environment variables (with `.env` support
//! via dotenvy at the binary boundary). Every service is constructed from
//! this struct explicitly; nothing reads the environment after startup.

use anyhow::{Context, Result};

/// Runtime configuration for the Copyspark backend
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the API server binds to
    pub bind_addr: String,

    /// Stripe API secret key (sk_...)
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: String,
    /// Price ID of the Copyspark Pro plan
    pub stripe_price_id: String,
    /// Message shown on the hosted confirmation page after payment
    pub payment_successful_text: String,

    /// Google Cloud project that hosts the Firestore database
    pub firestore_project_id: String,
    /// OAuth bearer token used to authenticate Firestore REST calls
    pub firestore_access_token: String,
    /// Base URL for the Firestore REST API (overridable for the emulator)
    pub firestore_base_url: String,

    /// How many lifetime copy generations a free-plan user gets
    pub max_free_copy_generations: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: optional_var("BIND_ADDR", "0.0.0.0:8080"),
            stripe_secret_key: required_var("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required_var("STRIPE_WEBHOOK_SECRET")?,
            stripe_price_id: required_var("STRIPE_PRICE_ID")?,
            payment_successful_text: optional_var(
                "PAYMENT_SUCCESSFUL_TEXT",
                "Thanks for upgrading to Copyspark Pro!",
            ),
            firestore_project_id: required_var("FIRESTORE_PROJECT_ID")?,
            firestore_access_token: required_var("FIRESTORE_ACCESS_TOKEN")?,
            firestore_base_url: optional_var(
                "FIRESTORE_BASE_URL",
                "https://firestore.googleapis.com",
            ),
            max_free_copy_generations: optional_var("MAX_FREE_COPY_GENERATIONS", "3")
                .parse()
                .context("MAX_FREE_COPY_GENERATIONS must be an integer")?,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn optional_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
