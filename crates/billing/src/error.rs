//! Billing error types

/// Errors produced by the billing crate
///
/// Unsupported-but-verified webhook events are deliberately NOT an error:
/// they are acknowledged so the gateway's redelivery logic does not keep
/// resending them.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Signature mismatch, stale timestamp, or a payload that cannot be
    /// decoded. Fatal to the request; nothing is persisted.
    #[error("webhook signature verification failed")]
    SignatureInvalid,

    /// The gateway customer lookup failed or the customer carries no linked
    /// user identifier. The audit record stays persisted; no patch happens.
    #[error("could not resolve user: {0}")]
    UserResolution(String),

    /// An audit append or user patch failed, including patches against a
    /// user document that does not exist.
    #[error("ledger store write failed: {0}")]
    Store(String),

    /// A payment gateway API call failed
    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("billing configuration error: {0}")]
    Config(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl From<copyspark_shared::FirestoreError> for BillingError {
    fn from(err: copyspark_shared::FirestoreError) -> Self {
        BillingError::Store(err.to_string())
    }
}
