//! Stripe webhook handling
//!
//! Verifies inbound webhook deliveries, audits every verified event, and
//! applies the matching subscription state transition to the user's
//! document.
//!
//! Delivery contract: the gateway retries on non-2xx responses
//! (at-least-once). Every transition here is an absolute overwrite of
//! named fields, never an increment, so redelivery and replays converge to
//! the same state. There is no retry inside the reconciler itself; a
//! failed transition surfaces as a delivery failure and redelivery is the
//! recovery mechanism.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::events::{EventKind, PlanStatus, SubscriptionChange, WebhookEvent};
use crate::gateway::{PaymentGateway, USER_ID_METADATA_KEY};
use crate::ledger::{LedgerStore, PaymentRecord, UserPatch};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, matching Stripe's default
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook handler for gateway events
pub struct WebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn LedgerStore>,
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn LedgerStore>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify and handle one webhook delivery end to end
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> BillingResult<()> {
        let event = self.verify_event(payload, signature_header)?;
        self.handle_event(event).await
    }

    /// Verify a delivery's signature and decode the event envelope
    ///
    /// The signature is computed over the exact raw bytes; re-serializing
    /// the body first would change the byte layout and break verification.
    /// Fail-closed: any failure here means nothing is persisted.
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> BillingResult<WebhookEvent> {
        let payload_str = std::str::from_utf8(payload).map_err(|_| {
            tracing::warn!("Webhook payload is not valid UTF-8");
            BillingError::SignatureInvalid
        })?;

        // Signature header format: t=timestamp,v1=signature[,v0=legacy]
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;
        for part in signature_header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = value.parse().ok(),
                    "v1" => v1_signature = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::SignatureInvalid
        })?;
        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::warn!("Missing v1 signature in signature header");
            BillingError::SignatureInvalid
        })?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp,
                now,
                diff = (now - timestamp).abs(),
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::SignatureInvalid);
        }

        let secret_key = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);
        let signed_payload = format!("{timestamp}.{payload_str}");

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
            tracing::error!("Invalid webhook secret key");
            BillingError::SignatureInvalid
        })?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::SignatureInvalid);
        }

        let event: WebhookEvent = serde_json::from_str(payload_str).map_err(|e| {
            tracing::warn!(parse_error = %e, "Failed to decode verified webhook payload");
            BillingError::SignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.id,
            "Verified webhook event"
        );
        Ok(event)
    }

    /// Handle a verified gateway event
    ///
    /// The audit record is written unconditionally before classification,
    /// so no verified event is silently dropped even when the type is
    /// unrecognized or a transition handler later fails. Unsupported kinds
    /// are acknowledged as handled so the gateway does not keep redelivering
    /// them.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        self.ledger.append_audit_record(&event).await?;

        match EventKind::classify(&event.event_type) {
            Some(EventKind::CheckoutSessionCompleted) => {
                self.handle_checkout_completed(&event).await
            }
            Some(EventKind::CustomerSubscriptionUpdated) => {
                self.handle_subscription_updated(&event).await
            }
            Some(EventKind::CustomerSubscriptionDeleted) => {
                self.handle_subscription_deleted(&event).await
            }
            None => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Unsupported gateway event type - audited, no transition"
                );
                Ok(())
            }
        }
    }

    /// checkout.session.completed: the user upgraded from Free to Pro
    ///
    /// The session carries the user id directly in its metadata, so no
    /// customer lookup is needed. Afterwards the gateway customer is tagged
    /// with the user id so later subscription events can resolve the user.
    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> BillingResult<()> {
        let object = &event.data.object;

        let user_id = object
            .get("metadata")
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                BillingError::UserResolution(
                    "checkout session carries no linked user id in metadata".into(),
                )
            })?;

        let customer_id = string_field(object, "customer");
        let subscription_id = string_field(object, "subscription");
        let payment_id = string_field(object, "id");

        // Payment audit is best effort; the subscription patch is what must
        // not be lost.
        let record = PaymentRecord::from_checkout_session(object);
        if let Err(e) = self.ledger.append_payment(&record).await {
            tracing::warn!(error = %e, user_id, "Failed to persist payment record");
        }

        let patch = UserPatch {
            status: Some(PlanStatus::Pro),
            gateway_customer_id: customer_id.clone(),
            latest_subscription_id: subscription_id,
            latest_payment_id: payment_id,
            latest_invoice_id: None,
        };
        self.ledger.patch_user(user_id, &patch).await?;

        if let Some(customer_id) = customer_id {
            let mut metadata = HashMap::new();
            metadata.insert(USER_ID_METADATA_KEY.to_string(), user_id.to_string());
            if let Err(e) = self
                .gateway
                .update_customer_metadata(&customer_id, metadata)
                .await
            {
                tracing::warn!(
                    error = %e,
                    customer_id,
                    "Failed to tag gateway customer with user id"
                );
            }
        }

        tracing::info!(user_id, event_id = %event.id, "Upgraded user to Pro");
        Ok(())
    }

    /// customer.subscription.updated: scheduled cancellation, reactivation,
    /// or period renewal, depending on what actually changed
    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> BillingResult<()> {
        let change = SubscriptionChange::classify(&event.data);

        // No-op delivery (e.g. metadata-only change): nothing to write and
        // no reason to pay for a customer lookup.
        if change == SubscriptionChange::NoChange {
            tracing::debug!(event_id = %event.id, "Subscription update changed nothing relevant");
            return Ok(());
        }

        let user_id = self.resolve_user(&event.data.object).await?;

        let patch = match change {
            SubscriptionChange::ScheduledCancellation => {
                tracing::info!(user_id, "Subscription set to cancel at period end");
                UserPatch::status(PlanStatus::ProPendingDowngrade)
            }
            SubscriptionChange::Reactivation => {
                tracing::info!(user_id, "Subscription reactivated");
                UserPatch::status(PlanStatus::Pro)
            }
            SubscriptionChange::Renewal => {
                tracing::info!(user_id, "Subscription renewed for another billing period");
                UserPatch {
                    latest_invoice_id: string_field(&event.data.object, "latest_invoice"),
                    ..UserPatch::default()
                }
            }
            SubscriptionChange::NoChange => return Ok(()),
        };

        self.ledger.patch_user(&user_id, &patch).await
    }

    /// customer.subscription.deleted: the downgrade has taken effect
    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> BillingResult<()> {
        let user_id = self.resolve_user(&event.data.object).await?;
        self.ledger
            .patch_user(&user_id, &UserPatch::status(PlanStatus::Free))
            .await?;

        tracing::info!(user_id, event_id = %event.id, "Downgraded user to Free");
        Ok(())
    }

    /// Recover the user id for events that only carry a gateway customer id
    ///
    /// This round trip is a hard dependency: if it fails the transition is
    /// not applied and the failure surfaces to the caller (the audit record
    /// from handle_event stays persisted).
    async fn resolve_user(&self, object: &serde_json::Value) -> BillingResult<String> {
        let customer_id = object
            .get("customer")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                BillingError::UserResolution("event object carries no customer id".into())
            })?;

        let customer = self
            .gateway
            .get_customer(customer_id)
            .await
            .map_err(|e| BillingError::UserResolution(e.to_string()))?;

        customer.user_id().map(str::to_string).ok_or_else(|| {
            BillingError::UserResolution(format!("customer {customer_id} has no linked user id"))
        })
    }
}

fn string_field(object: &serde_json::Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
