//! Billing Models
//!
//! Checkout responses and the subset of payment gateway webhook payloads the
//! service acts on.

use serde::{Deserialize, Serialize};

/// Event type granting premium
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Event type revoking premium
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Returned to the client, which redirects the browser to `url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Checkout session as returned by the gateway; `url` may be absent
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Webhook envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

/// Fields shared by checkout sessions and subscriptions that we read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookObject {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: WebhookMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// What a processed webhook did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WebhookOutcome {
    PremiumGranted { user_id: String },
    PremiumRevoked { user_id: String },
    /// Known event without the data needed to act, or no matching user
    Skipped,
    /// Event type we do not handle
    Ignored,
}
