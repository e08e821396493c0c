//! Shared fixtures for the integration tests

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use flow_timer::database::LocalStorage;
use flow_timer::models::auth::{AuthUser, FinishSignupRequest, IdpCredential};
use flow_timer::services::{AuthProvider, MockTimeProvider};
use flow_timer::{AppError, AppResult, Application, Config};

/// Signs in as whichever user the id token names
///
/// Account deletion demands a fresh login unless built with
/// [`FakeAuth::allowing_deletion`].
#[derive(Default)]
pub struct FakeAuth {
    user: Mutex<Option<AuthUser>>,
    changes: Mutex<Option<watch::Sender<Option<AuthUser>>>>,
    allow_deletion: bool,
}

impl FakeAuth {
    pub fn allowing_deletion() -> Self {
        Self {
            allow_deletion: true,
            ..Self::default()
        }
    }

    fn publish(&self, user: Option<AuthUser>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user.clone();
        if let Some(sender) = &*self.changes.lock().unwrap_or_else(PoisonError::into_inner) {
            sender.send_replace(user);
        }
    }
}

impl AuthProvider for FakeAuth {
    fn login_with_interactive_provider<'a>(
        &'a self,
        credential: &'a IdpCredential,
    ) -> BoxFuture<'a, AppResult<AuthUser>> {
        let user = AuthUser {
            uid: credential.id_token.clone(),
            email: Some(format!("{}@example.com", credential.id_token)),
            display_name: None,
        };
        self.publish(Some(user.clone()));
        Box::pin(async move { Ok(user) })
    }

    fn logout(&self) -> BoxFuture<'_, AppResult<()>> {
        self.publish(None);
        Box::pin(async { Ok(()) })
    }

    fn delete_current_account(&self) -> BoxFuture<'_, AppResult<()>> {
        if !self.allow_deletion {
            return Box::pin(async { Err(AppError::RequiresReauth) });
        }
        self.publish(None);
        Box::pin(async { Ok(()) })
    }

    fn send_email_activation_link<'a>(&'a self, _email: &'a str) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn complete_email_signup<'a>(
        &'a self,
        _request: &'a FinishSignupRequest,
    ) -> BoxFuture<'a, AppResult<AuthUser>> {
        Box::pin(async { Err(AppError::config_missing("email sign-up")) })
    }

    fn subscribe_to_auth_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        let mut changes = self.changes.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.user.lock().unwrap_or_else(PoisonError::into_inner).clone();
        changes
            .get_or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Clock fixed at Friday 2026-01-02 09:00 UTC
pub fn clock() -> Arc<MockTimeProvider> {
    Arc::new(MockTimeProvider::new_from_ymd_hms(2026, 1, 2, 9, 0, 0).unwrap())
}

pub async fn build_app(config: Config, storage: LocalStorage) -> Application {
    build_app_with_auth(config, storage, FakeAuth::default()).await
}

pub async fn build_app_with_auth(
    config: Config,
    storage: LocalStorage,
    auth: FakeAuth,
) -> Application {
    Application::build_with_auth(config, storage, clock(), Arc::new(auth))
        .await
        .unwrap()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
