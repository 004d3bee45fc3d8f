//! In-memory gateway and ledger mocks shared across the crate's tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{BillingError, BillingResult};
use crate::events::WebhookEvent;
use crate::gateway::{GatewayCustomer, PaymentGateway};
use crate::ledger::{LedgerStore, PaymentRecord, UserPatch, UserRecord};

/// Gateway mock backed by a customer map
#[derive(Default)]
pub struct MockGateway {
    pub customers: Mutex<HashMap<String, GatewayCustomer>>,
    pub metadata_updates: Mutex<Vec<(String, HashMap<String, String>)>>,
    pub payment_links: Mutex<Vec<String>>,
    pub portal_sessions: Mutex<Vec<String>>,
    /// How many customer-lookup round trips the reconciler made
    pub lookups: Mutex<usize>,
}

impl MockGateway {
    /// Register a customer whose metadata links back to `user_id`
    pub fn with_customer(self, customer_id: &str, user_id: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(crate::gateway::USER_ID_METADATA_KEY.to_string(), user_id.to_string());
        self.customers.lock().unwrap().insert(
            customer_id.to_string(),
            GatewayCustomer {
                id: customer_id.to_string(),
                metadata,
            },
        );
        self
    }

    /// Register a customer with no linked user
    pub fn with_unlinked_customer(self, customer_id: &str) -> Self {
        self.customers.lock().unwrap().insert(
            customer_id.to_string(),
            GatewayCustomer {
                id: customer_id.to_string(),
                metadata: HashMap::new(),
            },
        );
        self
    }

    pub fn lookup_count(&self) -> usize {
        *self.lookups.lock().unwrap()
    }

    fn record_lookup(&self) {
        *self.lookups.lock().unwrap() += 1;
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn get_customer(&self, customer_id: &str) -> BillingResult<GatewayCustomer> {
        self.record_lookup();
        self.customers
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| BillingError::Gateway(format!("no such customer: {customer_id}")))
    }

    async fn update_customer_metadata(
        &self,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> BillingResult<()> {
        self.metadata_updates
            .lock()
            .unwrap()
            .push((customer_id.to_string(), metadata));
        Ok(())
    }

    async fn create_payment_link(&self, user_id: &str) -> BillingResult<String> {
        self.payment_links.lock().unwrap().push(user_id.to_string());
        Ok(format!("https://buy.stripe.test/{user_id}"))
    }

    async fn create_portal_session(&self, customer_id: &str) -> BillingResult<String> {
        self.portal_sessions
            .lock()
            .unwrap()
            .push(customer_id.to_string());
        Ok("https://billing.stripe.test/session".to_string())
    }
}

/// Ledger mock that records every write
#[derive(Default)]
pub struct MockLedger {
    pub audit: Mutex<Vec<WebhookEvent>>,
    pub payments: Mutex<Vec<PaymentRecord>>,
    pub patches: Mutex<Vec<(String, UserPatch)>>,
    pub users: Mutex<HashMap<String, UserRecord>>,
    pub fail_patches: bool,
}

impl MockLedger {
    pub fn with_user(self, user_id: &str, record: UserRecord) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), record);
        self
    }

    pub fn audit_count(&self) -> usize {
        self.audit.lock().unwrap().len()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerStore for MockLedger {
    async fn append_audit_record(&self, event: &WebhookEvent) -> BillingResult<()> {
        self.audit.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn append_payment(&self, record: &PaymentRecord) -> BillingResult<()> {
        self.payments.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> BillingResult<()> {
        if self.fail_patches {
            return Err(BillingError::Store("injected patch failure".into()));
        }
        if !self.users.lock().unwrap().contains_key(user_id) {
            return Err(BillingError::Store(format!("user not found: {user_id}")));
        }
        self.patches
            .lock()
            .unwrap()
            .push((user_id.to_string(), patch.clone()));
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> BillingResult<UserRecord> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| BillingError::Store(format!("user not found: {user_id}")))
    }
}
