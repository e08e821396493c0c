//! Auth Provider
//!
//! Sign-in through the Identity Toolkit REST API. The browser runs the
//! interactive provider popup and hands us the resulting id token; this
//! service exchanges it for a session and publishes auth state changes.

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};
use url::Url;

use crate::database::stats_store::StatsStore;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::logging::{log_authentication_event, log_persistence_failure};
use crate::models::auth::{AuthUser, FinishSignupRequest, IdpCredential, validate_email};

pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Identity provider operations used by the application
pub trait AuthProvider: Send + Sync {
    /// Exchange the credential produced by the provider popup for a session
    fn login_with_interactive_provider<'a>(
        &'a self,
        credential: &'a IdpCredential,
    ) -> BoxFuture<'a, AppResult<AuthUser>>;

    fn logout(&self) -> BoxFuture<'_, AppResult<()>>;

    /// Fails with [`AppError::RequiresReauth`] when the login is too old
    fn delete_current_account(&self) -> BoxFuture<'_, AppResult<()>>;

    fn send_email_activation_link<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<()>>;

    /// Finish the email-link sign-up by setting a password and name
    fn complete_email_signup<'a>(
        &'a self,
        request: &'a FinishSignupRequest,
    ) -> BoxFuture<'a, AppResult<AuthUser>>;

    /// Current user now and after every sign-in or sign-out
    fn subscribe_to_auth_changes(&self) -> watch::Receiver<Option<AuthUser>>;

    fn current_user(&self) -> Option<AuthUser>;
}

/// Signed-in user with the token the provider expects on later calls
#[derive(Debug, Clone)]
struct ProviderSession {
    user: AuthUser,
    id_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: ProviderError,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

/// Map an Identity Toolkit error code onto the application error taxonomy
///
/// Codes sometimes carry a detail suffix, e.g. `WEAK_PASSWORD : Password
/// should be at least 6 characters`.
pub fn map_provider_error(message: &str) -> AppError {
    let code = message.split([' ', ':']).next().unwrap_or_default();

    match code {
        "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => AppError::RequiresReauth,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "USER_DISABLED"
        | "INVALID_IDP_RESPONSE" | "INVALID_OOB_CODE" | "EXPIRED_OOB_CODE" => {
            AppError::unauthenticated(code)
        }
        "INVALID_EMAIL" | "WEAK_PASSWORD" | "MISSING_EMAIL" | "EMAIL_EXISTS" => {
            AppError::validation_error(message)
        }
        "" => AppError::Upstream("identity provider returned an error".to_string()),
        _ => AppError::Upstream(message.to_string()),
    }
}

pub struct IdentityToolkitAuth {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    client_url: String,
    session: Mutex<Option<ProviderSession>>,
    changes: watch::Sender<Option<AuthUser>>,
}

impl IdentityToolkitAuth {
    /// Without an API key every provider call fails with `ConfigMissing`
    pub fn new(api_key: Option<String>, client_url: &str) -> Self {
        let (changes, _) = watch::channel(None);

        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            client_url: client_url.trim_end_matches('/').to_string(),
            session: Mutex::new(None),
            changes,
        }
    }

    /// Point the client at another endpoint (emulator, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn id_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.id_token.clone())
    }

    fn set_session(&self, session: Option<ProviderSession>) {
        let user = session.as_ref().map(|s| s.user.clone());
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
        self.changes.send_replace(user);
    }

    fn endpoint(&self, method: &str) -> AppResult<Url> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::config_missing("identity provider API key"))?;

        let mut url = Url::parse(&format!("{}/accounts:{}", self.base_url, method))?;
        url.query_pairs_mut().append_pair("key", key);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> AppResult<T> {
        let url = self.endpoint(method)?;
        debug!(method = %method, "Identity provider request");

        let response = self.client.post(url).json(&body).send().await?;
        if response.status().is_success() {
            return Ok(response.json::<T>().await?);
        }

        let status = response.status();
        let body: ProviderErrorBody = response.json().await.unwrap_or_default();
        debug!(method = %method, status = %status, code = %body.error.message, "Identity provider error");
        Err(map_provider_error(&body.error.message))
    }

    fn session_from(response: SignInResponse) -> ProviderSession {
        ProviderSession {
            user: AuthUser {
                uid: response.local_id,
                email: response.email,
                display_name: response.display_name,
            },
            id_token: response.id_token,
        }
    }

    async fn login(&self, credential: &IdpCredential) -> AppResult<AuthUser> {
        let post_body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", &credential.id_token)
            .append_pair("providerId", &credential.provider_id)
            .finish();

        let response: SignInResponse = self
            .call(
                "signInWithIdp",
                json!({
                    "postBody": post_body,
                    "requestUri": self.client_url,
                    "returnSecureToken": true,
                    "returnIdpCredential": true,
                }),
            )
            .await?;

        let session = Self::session_from(response);
        let user = session.user.clone();
        self.set_session(Some(session));
        Ok(user)
    }

    async fn delete_provider_account(&self) -> AppResult<()> {
        let id_token = self
            .id_token()
            .ok_or_else(|| AppError::unauthenticated("No user logged in"))?;

        self.call::<serde_json::Value>("delete", json!({ "idToken": id_token }))
            .await?;

        self.set_session(None);
        Ok(())
    }

    async fn send_link(&self, email: &str) -> AppResult<()> {
        validate_email(email).map_err(|e| AppError::validation_error(&e.to_string()))?;

        self.call::<serde_json::Value>(
            "sendOobCode",
            json!({
                "requestType": "EMAIL_SIGNIN",
                "email": email,
                "continueUrl": format!("{}/finish-signup", self.client_url),
                "canHandleCodeInApp": true,
            }),
        )
        .await?;

        Ok(())
    }

    async fn finish_signup(&self, request: &FinishSignupRequest) -> AppResult<AuthUser> {
        request
            .validate()
            .map_err(|e| AppError::validation_error(&e.to_string()))?;

        let signed_in: SignInResponse = self
            .call(
                "signInWithEmailLink",
                json!({
                    "email": request.email,
                    "oobCode": request.oob_code,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        let mut session = Self::session_from(signed_in);

        let mut update = json!({
            "idToken": session.id_token,
            "password": request.password,
            "returnSecureToken": true,
        });
        if let Some(name) = request.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            update["displayName"] = json!(name);
        }

        let updated: UpdateResponse = self.call("update", update).await?;
        if let Some(token) = updated.id_token {
            session.id_token = token;
        }
        if updated.display_name.is_some() {
            session.user.display_name = updated.display_name;
        }

        let user = session.user.clone();
        self.set_session(Some(session));
        Ok(user)
    }
}

impl AuthProvider for IdentityToolkitAuth {
    fn login_with_interactive_provider<'a>(
        &'a self,
        credential: &'a IdpCredential,
    ) -> BoxFuture<'a, AppResult<AuthUser>> {
        Box::pin(async move {
            let result = self.login(credential).await;
            let uid = result.as_ref().ok().map(|user| user.uid.as_str());
            log_authentication_event("login", uid, result.is_ok());
            result
        })
    }

    fn logout(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async move {
            if self.api_key.is_none() {
                return Ok(());
            }

            let previous = self.current_user();
            self.set_session(None);
            if let Some(user) = previous {
                info!(user_id = %user.uid, "User logged out");
            }
            Ok(())
        })
    }

    fn delete_current_account(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(self.delete_provider_account())
    }

    fn send_email_activation_link<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(self.send_link(email))
    }

    fn complete_email_signup<'a>(
        &'a self,
        request: &'a FinishSignupRequest,
    ) -> BoxFuture<'a, AppResult<AuthUser>> {
        Box::pin(async move {
            let result = self.finish_signup(request).await;
            let uid = result.as_ref().ok().map(|user| user.uid.as_str());
            log_authentication_event("finish_signup", uid, result.is_ok());
            result
        })
    }

    fn subscribe_to_auth_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.changes.subscribe()
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.user.clone())
    }
}

/// Delete the signed-in user's data, then their account
///
/// When the provider demands a fresh login the user is logged out and the
/// error is passed on so the client can explain why.
pub async fn delete_account(auth: &dyn AuthProvider, store: &dyn StatsStore) -> AppResult<()> {
    let user = auth
        .current_user()
        .ok_or_else(|| AppError::unauthenticated("No user logged in"))?;

    store.delete_user_data(&user.uid).await?;

    match auth.delete_current_account().await {
        Ok(()) => {
            info!(user_id = %user.uid, "Account deleted");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::RequiresReauth => {
            if let Err(logout_error) = auth.logout().await {
                log_persistence_failure("auth_session", &logout_error);
            }
            log_authentication_event("delete_account", Some(&user.uid), false);
            Err(e)
        }
        Err(e) => Err(e),
    }
}
