//! Ledger store
//!
//! The document database behind the reconciler, reduced to the four
//! operations the billing code needs. The production implementation writes
//! to Firestore through the shared REST client; tests use an in-memory
//! mock.
//!
//! Every user write is an absolute overwrite of named fields (never an
//! increment), which is what makes at-least-once webhook redelivery safe.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use copyspark_shared::FirestoreClient;

use crate::error::{BillingError, BillingResult};
use crate::events::{PlanStatus, WebhookEvent};

pub const EVENTS_COLLECTION: &str = "events";
pub const PAYMENTS_COLLECTION: &str = "payments";
pub const USERS_COLLECTION: &str = "users";

/// Partial update of a user's subscription fields
///
/// Only the fields that are `Some` are written; the store stamps
/// `dateOfLastTransition` itself on every patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_invoice_id: Option<String>,
}

impl UserPatch {
    pub fn status(status: PlanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Payment details captured from a completed checkout session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_subtotal: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
}

impl PaymentRecord {
    /// Lift the interesting fields out of a checkout session object
    pub fn from_checkout_session(object: &Value) -> Self {
        let get_str = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            session_id: get_str("id").unwrap_or_default(),
            user_id: object
                .get("metadata")
                .and_then(|m| m.get(crate::gateway::USER_ID_METADATA_KEY))
                .and_then(Value::as_str)
                .map(str::to_string),
            gateway_customer_id: get_str("customer"),
            subscription_id: get_str("subscription"),
            amount_subtotal: object.get("amount_subtotal").and_then(Value::as_i64),
            amount_total: object.get("amount_total").and_then(Value::as_i64),
            currency: get_str("currency"),
            payment_status: get_str("payment_status"),
        }
    }
}

/// A user document, reduced to what billing reads back
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub status: PlanStatus,
    pub lifetime_copy_generations: i64,
}

impl UserRecord {
    pub fn from_fields(fields: &Value) -> Self {
        let status = fields
            .get("status")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(PlanStatus::Free);
        let lifetime_copy_generations = fields
            .get("lifetime_copy_generations")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Self {
            status,
            lifetime_copy_generations,
        }
    }
}

/// Document store operations used by the billing crate
///
/// Audit records are append-only; user records pre-exist (created at
/// sign-up, outside this crate) and are only ever patched here.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a verified webhook event for audit, stamping `receivedAt`
    async fn append_audit_record(&self, event: &WebhookEvent) -> BillingResult<()>;

    /// Persist the payment details of a completed checkout session
    async fn append_payment(&self, record: &PaymentRecord) -> BillingResult<()>;

    /// Apply a partial update to an existing user document as one atomic
    /// write; fails if the user does not exist
    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> BillingResult<()>;

    /// Read a user document back (quota gate)
    async fn get_user(&self, user_id: &str) -> BillingResult<UserRecord>;
}

/// Firestore-backed ledger
#[derive(Clone)]
pub struct FirestoreLedger {
    client: FirestoreClient,
}

impl FirestoreLedger {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LedgerStore for FirestoreLedger {
    async fn append_audit_record(&self, event: &WebhookEvent) -> BillingResult<()> {
        let payload = serde_json::to_value(event)
            .map_err(|e| BillingError::Store(format!("unencodable event: {e}")))?;
        let fields = json!({
            "eventId": event.id,
            "type": event.event_type,
            "receivedAt": now_rfc3339(),
            "payload": payload,
        });

        self.client
            .create_document(EVENTS_COLLECTION, fields)
            .await?;
        Ok(())
    }

    async fn append_payment(&self, record: &PaymentRecord) -> BillingResult<()> {
        let mut fields = serde_json::to_value(record)
            .map_err(|e| BillingError::Store(format!("unencodable payment: {e}")))?;
        if let Some(map) = fields.as_object_mut() {
            map.insert("receivedAt".into(), json!(now_rfc3339()));
        }

        self.client
            .create_document(PAYMENTS_COLLECTION, fields)
            .await?;
        Ok(())
    }

    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> BillingResult<()> {
        let mut fields = serde_json::to_value(patch)
            .map_err(|e| BillingError::Store(format!("unencodable patch: {e}")))?;
        let map = fields
            .as_object_mut()
            .ok_or_else(|| BillingError::Store("patch did not serialize to an object".into()))?;
        map.insert("dateOfLastTransition".into(), json!(now_rfc3339()));

        let field_paths: Vec<String> = map.keys().cloned().collect();
        let paths: Vec<&str> = field_paths.iter().map(String::as_str).collect();

        self.client
            .patch_document(USERS_COLLECTION, user_id, fields.clone(), &paths)
            .await?;

        tracing::info!(user_id, ?patch, "Patched user subscription fields");
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> BillingResult<UserRecord> {
        let fields = self.client.get_document(USERS_COLLECTION, user_id).await?;
        Ok(UserRecord::from_fields(&fields))
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_patch_serializes_only_set_fields() {
        let patch = UserPatch {
            status: Some(PlanStatus::Pro),
            gateway_customer_id: Some("cus_1".into()),
            latest_subscription_id: Some("sub_1".into()),
            latest_payment_id: Some("in_1".into()),
            latest_invoice_id: None,
        };

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "Pro",
                "gatewayCustomerId": "cus_1",
                "latestSubscriptionId": "sub_1",
                "latestPaymentId": "in_1",
            })
        );
    }

    #[test]
    fn status_only_patch_has_a_single_field() {
        let value = serde_json::to_value(UserPatch::status(PlanStatus::Free)).unwrap();
        assert_eq!(value, json!({ "status": "Free" }));
    }

    #[test]
    fn payment_record_lifts_checkout_session_fields() {
        let session = json!({
            "id": "cs_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "amount_subtotal": 900,
            "amount_total": 1000,
            "currency": "usd",
            "payment_status": "paid",
            "metadata": { "userId": "u1" },
        });

        let record = PaymentRecord::from_checkout_session(&session);
        assert_eq!(record.session_id, "cs_1");
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.gateway_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.amount_total, Some(1000));
    }

    #[test]
    fn user_record_defaults_missing_fields() {
        let record = UserRecord::from_fields(&json!({}));
        assert_eq!(record.status, PlanStatus::Free);
        assert_eq!(record.lifetime_copy_generations, 0);

        let record = UserRecord::from_fields(&json!({
            "status": "Pro (pending downgrade)",
            "lifetime_copy_generations": 12,
        }));
        assert_eq!(record.status, PlanStatus::ProPendingDowngrade);
        assert_eq!(record.lifetime_copy_generations, 12);
    }

    #[tokio::test]
    async fn patch_user_sends_update_mask_for_each_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "PATCH",
                "/v1/projects/prop-prose/databases/(default)/documents/users/u1",
            )
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("currentDocument.exists".into(), "true".into()),
                // mockito's UrlEncoded matcher collapses repeated query keys
                // into a HashMap, so the repeated updateMask.fieldPaths pairs
                // must be matched against the raw query string instead.
                mockito::Matcher::Regex(r"updateMask\.fieldPaths=status(&|$)".into()),
                mockito::Matcher::Regex(
                    r"updateMask\.fieldPaths=dateOfLastTransition(&|$)".into(),
                ),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = FirestoreClient::new(&server.url(), "prop-prose", "token");
        let ledger = FirestoreLedger::new(client);
        ledger
            .patch_user("u1", &UserPatch::status(PlanStatus::Pro))
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
