//! Webhook event envelope and classification
//!
//! The envelope is decoded from the raw webhook bytes with our own serde
//! types; the raw payload is never re-serialized before signature
//! verification, because re-serialization changes the byte layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A verified, decoded webhook event from the payment gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Gateway-assigned event identifier (evt_...)
    pub id: String,
    /// Event type string, e.g. "checkout.session.completed"
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp the gateway created the event
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

/// Event payload: the affected object plus, on update events, the previous
/// values of the fields that changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<Value>,
}

/// The closed set of event kinds this backend acts on
///
/// Everything else is verified and audited but triggers no state
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
}

impl EventKind {
    /// Classify a raw event-type string, `None` for unsupported kinds
    pub fn classify(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::CheckoutSessionCompleted),
            "customer.subscription.updated" => Some(Self::CustomerSubscriptionUpdated),
            "customer.subscription.deleted" => Some(Self::CustomerSubscriptionDeleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
        }
    }
}

/// Subscription plan state, persisted verbatim on the user document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    #[serde(rename = "Free")]
    Free,
    #[serde(rename = "Pro")]
    Pro,
    #[serde(rename = "Pro (pending downgrade)")]
    ProPendingDowngrade,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Pro => "Pro",
            Self::ProPendingDowngrade => "Pro (pending downgrade)",
        }
    }

    /// Paid users, including those with a cancellation scheduled, keep Pro
    /// features until the period actually ends.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Pro | Self::ProPendingDowngrade)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `customer.subscription.updated` delivery actually changed
///
/// Derived from the previous-attributes snapshot, which only contains the
/// fields that changed in this delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// cancel_at_period_end flipped false -> true
    ScheduledCancellation,
    /// cancel_at_period_end flipped true -> false
    Reactivation,
    /// Both billing period boundaries moved and the cancel flag is unchanged
    Renewal,
    /// Metadata-only or otherwise uninteresting delivery; not an error
    NoChange,
}

impl SubscriptionChange {
    pub fn classify(data: &EventData) -> Self {
        let object = &data.object;
        let previous = match &data.previous_attributes {
            Some(prev) => prev,
            // Nothing changed that the gateway chose to report
            None => return Self::NoChange,
        };

        let cancel_before = previous.get("cancel_at_period_end").and_then(Value::as_bool);
        let cancel_after = object
            .get("cancel_at_period_end")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match cancel_before {
            Some(false) if cancel_after => return Self::ScheduledCancellation,
            Some(true) if !cancel_after => return Self::Reactivation,
            // The flag appears in the snapshot but did not actually flip
            Some(_) => return Self::NoChange,
            None => {}
        }

        let start_moved = field_changed(previous, object, "current_period_start");
        let end_moved = field_changed(previous, object, "current_period_end");
        if start_moved && end_moved {
            return Self::Renewal;
        }

        Self::NoChange
    }
}

fn field_changed(previous: &Value, object: &Value, key: &str) -> bool {
    match (previous.get(key), object.get(key)) {
        (Some(before), Some(after)) => before != after,
        _ => false,
    }
}
