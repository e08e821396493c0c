//! Billing Service
//!
//! Premium subscriptions through Stripe: creates checkout sessions for the
//! signed-in user and applies signed webhook events to the stats store.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::stats_store::SharedStatsStore;
use crate::error::{AppError, AppResult};
use crate::logging::log_webhook_event;
use crate::models::auth::AuthUser;
use crate::models::billing::{
    CheckoutResponse, GatewayCheckoutSession, WebhookEvent, WebhookOutcome, CHECKOUT_COMPLETED,
    SUBSCRIPTION_DELETED,
};

pub const DEFAULT_STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

/// Accepted clock difference between the signature timestamp and now
pub const SIGNATURE_TOLERANCE_SECONDS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Default, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    error: GatewayError,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: Option<String>,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
///
/// The signed payload is `"<t>.<body>"`. Any `v1` entry may match.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> AppResult<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::InvalidSignature("no v1 signature".to_string()));
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECONDS {
        return Err(AppError::InvalidSignature(
            "timestamp outside the tolerance zone".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal_error(&e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|expected| mac.clone().verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature(
            "no signature matches the payload".to_string(),
        ))
    }
}

pub struct BillingService {
    client: reqwest::Client,
    store: SharedStatsStore,
    base_url: String,
    secret_key: Option<String>,
    price_id: Option<String>,
    webhook_secret: Option<String>,
    client_url: String,
}

impl BillingService {
    pub fn new(config: &Config, store: SharedStatsStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
            base_url: DEFAULT_STRIPE_BASE_URL.to_string(),
            secret_key: config.stripe_secret_key.clone(),
            price_id: config.stripe_price_id.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            client_url: config.client_url.trim_end_matches('/').to_string(),
        }
    }

    /// Point the client at another endpoint (stripe-mock, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Create a subscription checkout session for `user`
    pub async fn start_checkout(&self, user: Option<&AuthUser>) -> AppResult<CheckoutResponse> {
        let user = user.ok_or_else(|| AppError::unauthenticated("User must be logged in."))?;

        let stats = self.store.fetch_user_data(&user.uid).await?;
        if stats.is_premium {
            return Err(AppError::conflict("User is already a premium member."));
        }

        let price_id = self
            .price_id
            .as_deref()
            .ok_or_else(|| AppError::config_missing("STRIPE_PRICE_ID"))?;
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or_else(|| AppError::config_missing("STRIPE_SECRET_KEY"))?;

        let existing_customer = self.store.customer_id(&user.uid).await?;

        let mut form: Vec<(&str, String)> = vec![
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[userId]", user.uid.clone()),
            ("success_url", format!("{}/?success=true", self.client_url)),
            ("cancel_url", format!("{}/?canceled=true", self.client_url)),
        ];
        match (&existing_customer, &user.email) {
            (Some(customer), _) => form.push(("customer", customer.clone())),
            (None, Some(email)) => form.push(("customer_email", email.clone())),
            (None, None) => {}
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(secret_key)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: GatewayErrorBody = response.json().await.unwrap_or_default();
            let message = body
                .error
                .message
                .unwrap_or_else(|| "Failed to create checkout session.".to_string());
            warn!(status = %status, error = %message, "Checkout session creation failed");
            return Err(AppError::Upstream(message));
        }

        let session: GatewayCheckoutSession = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| AppError::Upstream("Checkout session has no URL".to_string()))?;

        info!(
            user_id = %user.uid,
            session_id = %session.id,
            reused_customer = existing_customer.is_some(),
            "Checkout session created"
        );
        Ok(CheckoutResponse { url })
    }

    /// Verify, parse and apply a raw webhook request
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::config_missing("STRIPE_WEBHOOK_SECRET"))?;
        let signature = signature
            .ok_or_else(|| AppError::InvalidSignature("missing Stripe-Signature header".to_string()))?;

        verify_webhook_signature(payload, signature, secret, Utc::now().timestamp())?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {e}")))?;

        self.handle_webhook_event(&event).await
    }

    /// Apply an already verified event
    pub async fn handle_webhook_event(&self, event: &WebhookEvent) -> AppResult<WebhookOutcome> {
        debug!(event_id = %event.id, event_type = %event.event_type, "Webhook event received");
        let object = &event.data.object;

        let outcome = match event.event_type.as_str() {
            CHECKOUT_COMPLETED => match object.metadata.user_id.as_deref() {
                Some(user_id) => {
                    self.store
                        .mark_premium(user_id, object.customer.as_deref())
                        .await?;
                    WebhookOutcome::PremiumGranted {
                        user_id: user_id.to_string(),
                    }
                }
                None => WebhookOutcome::Skipped,
            },
            SUBSCRIPTION_DELETED => match object.customer.as_deref() {
                Some(customer) => match self.store.revoke_premium_for_customer(customer).await? {
                    Some(user_id) => WebhookOutcome::PremiumRevoked { user_id },
                    None => WebhookOutcome::Skipped,
                },
                None => WebhookOutcome::Skipped,
            },
            _ => WebhookOutcome::Ignored,
        };

        let user_id = match &outcome {
            WebhookOutcome::PremiumGranted { user_id } | WebhookOutcome::PremiumRevoked { user_id } => {
                Some(user_id.as_str())
            }
            WebhookOutcome::Skipped | WebhookOutcome::Ignored => None,
        };
        log_webhook_event(&event.event_type, user_id, user_id.is_some());

        Ok(outcome)
    }
}
