//! Billing API Endpoints
//!
//! Checkout for the signed-in user and the payment gateway's webhook. The
//! webhook takes the raw body since the signature covers its exact bytes.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::billing::CheckoutResponse;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Create billing API routes
pub fn create_billing_routes() -> Router<AppState> {
    Router::new()
        .route("/billing/checkout", post(create_checkout_session))
        .route("/billing/webhook", post(payment_webhook))
}

/// Start a subscription checkout; the client redirects to the returned URL
pub async fn create_checkout_session(
    State(state): State<AppState>,
) -> AppResult<Json<CheckoutResponse>> {
    let user = state.auth.current_user();
    Ok(Json(state.billing.start_checkout(user.as_ref()).await?))
}

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.billing.process_webhook(&body, signature).await?;
    Ok(Json(json!({ "received": true, "outcome": outcome })))
}
