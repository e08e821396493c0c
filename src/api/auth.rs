//! Auth API Endpoints
//!
//! Sign-in, sign-out, the email-link sign-up flow and account deletion.
//! Changes in the signed-in user reach the timer through the provider's
//! auth-state channel, not through these handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::auth::{AuthUser, EmailLinkRequest, FinishSignupRequest, IdpCredential};
use crate::services::auth_service::delete_account;

/// Create auth API routes
pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(current_user))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/email-link", post(send_email_link))
        .route("/auth/finish-signup", post(finish_signup))
        .route("/auth/account", delete(delete_current_account))
}

pub async fn current_user(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "user": state.auth.current_user() }))
}

/// Exchange the provider popup's id token for a session
pub async fn login(
    State(state): State<AppState>,
    Json(credential): Json<IdpCredential>,
) -> AppResult<Json<AuthUser>> {
    let user = state.auth.login_with_interactive_provider(&credential).await?;
    Ok(Json(user))
}

pub async fn logout(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.auth.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_email_link(
    State(state): State<AppState>,
    Json(request): Json<EmailLinkRequest>,
) -> AppResult<Json<Value>> {
    state.auth.send_email_activation_link(&request.email).await?;
    Ok(Json(json!({ "sent": true, "email": request.email })))
}

/// Set password and display name after following the emailed link
pub async fn finish_signup(
    State(state): State<AppState>,
    Json(request): Json<FinishSignupRequest>,
) -> AppResult<Json<AuthUser>> {
    let user = state.auth.complete_email_signup(&request).await?;
    Ok(Json(user))
}

/// Delete the user's statistics, then the account itself
///
/// Syncing stops first so the merged local history is not uploaded back
/// into the deleted document.
pub async fn delete_current_account(State(state): State<AppState>) -> AppResult<StatusCode> {
    state.timer.detach_user().await;

    if let Err(e) = delete_account(state.auth.as_ref(), state.store.as_ref()).await {
        state.timer.attach_user(state.auth.current_user()).await;
        return Err(e);
    }

    Ok(StatusCode::NO_CONTENT)
}
