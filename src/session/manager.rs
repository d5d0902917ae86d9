// Session manager: auth primitives plus a single-flight profile cache

use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::backend::{AuthBackend, AuthEvent, ResetResult, Session, SessionData, SignUpOptions, User};
use crate::client::DataClient;
use crate::config::AuthConfig;
use crate::error::{AuthError, SessionError};
use crate::session::cache::{CacheState, ProfileCache, ProfileFetch};
use crate::session::relay::{AuthEventRelay, AuthNotification, AuthSubscription};
use crate::session::types::{Profile, UserData};
use crate::storage::TokenStore;

/// Capacity of the relayed notification channel
const NOTIFICATION_CAPACITY: usize = 64;

/// Lowercase and trim an email address before it reaches the backend
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Stable surface over authentication state and the current user's profile.
///
/// Lookups (`is_authenticated`, `get_current_user`, `get_user_profile`) never
/// fail; mutations log and return their error.
pub struct SessionManager {
    auth: Arc<dyn AuthBackend>,
    data: DataClient,
    store: Arc<dyn TokenStore>,
    settings: AuthConfig,
    cache: ProfileCache,
    relay: AuthEventRelay,
}

impl SessionManager {
    /// Must be called from within a Tokio runtime; subscribes the event relay
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        data: DataClient,
        store: Arc<dyn TokenStore>,
        settings: AuthConfig,
    ) -> Self {
        let relay = AuthEventRelay::spawn(auth.subscribe(), NOTIFICATION_CAPACITY);
        Self {
            auth,
            data,
            store,
            settings,
            cache: ProfileCache::new(),
            relay,
        }
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    pub fn data(&self) -> &DataClient {
        &self.data
    }

    /// Relayed `auth-state-change` notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AuthNotification> {
        self.relay.subscribe()
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.auth.get_session().await {
            Ok(session) => session.is_some(),
            Err(e) => {
                tracing::error!("Error checking authentication: {}", e);
                false
            }
        }
    }

    pub async fn get_current_user(&self) -> Option<User> {
        match self.auth.get_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!("Error getting current user: {}", e);
                None
            }
        }
    }

    /// Current user's profile, fetched at most once until invalidated.
    ///
    /// Concurrent callers share one fetch. A cached profile is returned as is,
    /// even when `user_id` names someone else.
    pub async fn get_user_profile(&self, user_id: Option<&str>) -> Option<Profile> {
        loop {
            let generation = match self.cache.state() {
                CacheState::Ready(profile) => return Some(profile),
                CacheState::Pending(fetch) => return fetch.await,
                CacheState::Empty(generation) => generation,
            };

            let user_id = match user_id {
                Some(id) => id.to_string(),
                None => self.get_current_user().await?.id,
            };

            // A sign-in or sign-out while the user was resolved makes the id stale
            match self
                .cache
                .start_with(generation, |generation| self.spawn_profile_fetch(user_id, generation))
            {
                Some(fetch) => return fetch.await,
                None => tracing::debug!("Session changed during profile lookup, resolving the user again"),
            }
        }
    }

    fn spawn_profile_fetch(&self, user_id: String, generation: u64) -> ProfileFetch {
        let data = self.data.clone();
        let cache = self.cache.clone();
        let collection = self.settings.profile_collection.clone();

        // Runs on its own task so the cache settles even if every caller goes away
        let task = tokio::spawn(async move {
            tracing::debug!("Fetching profile for user {}", user_id);
            let fetched = data
                .from(collection)
                .select("*")
                .eq("id", user_id.as_str())
                .single()
                .execute()
                .await
                .and_then(|response| response.single::<Profile>());

            match fetched {
                Ok(profile) => {
                    cache.finish(generation, Some(profile.clone()));
                    Some(profile)
                }
                Err(e) => {
                    tracing::error!("Error fetching user profile: {}", e);
                    cache.finish(generation, None);
                    None
                }
            }
        });

        let cache = self.cache.clone();
        task.map(move |joined| match joined {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!("Profile fetch task failed: {}", e);
                cache.finish(generation, None);
                None
            }
        })
        .boxed()
        .shared()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionData, AuthError> {
        let email = normalize_email(email);

        match self.auth.sign_in_with_password(&email, password).await {
            Ok(data) => {
                // New identity: force a fresh profile fetch
                self.cache.invalidate();
                tracing::info!("Signed in as {}", email);
                Ok(data)
            }
            Err(e) => {
                let error = AuthError::translate(e, "Invalid login credentials", AuthError::InvalidCredentials);
                tracing::error!("Sign in error: {}", error);
                Err(error)
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str, user_data: &UserData) -> Result<SessionData, AuthError> {
        let email = normalize_email(email);
        let options = SignUpOptions {
            data: user_data.to_metadata(),
            email_redirect_to: Some(self.settings.signup_redirect()),
        };

        match self.auth.sign_up(&email, password, options).await {
            Ok(data) => {
                if data.session.is_some() {
                    self.cache.invalidate();
                }
                tracing::info!("Registered {}", email);
                Ok(data)
            }
            Err(e) => {
                let error = AuthError::translate(e, "already registered", AuthError::AlreadyRegistered);
                tracing::error!("Sign up error: {}", error);
                Err(error)
            }
        }
    }

    /// Clears the profile cache before the backend call, so it stays cleared
    /// even when sign-out fails
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.cache.invalidate();

        if let Err(e) = self.auth.sign_out().await {
            let error = AuthError::Backend(e);
            tracing::error!("Sign out error: {}", error);
            return Err(error);
        }

        if let Err(e) = self.store.remove(&self.settings.storage_key) {
            tracing::warn!("Failed to remove stored auth token: {}", e);
        }
        tracing::info!("Signed out");
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<ResetResult, AuthError> {
        let redirect_to = self.settings.reset_redirect();

        self.auth
            .reset_password_for_email(email, &redirect_to)
            .await
            .map_err(|e| {
                let error = AuthError::translate(e, "user not found", AuthError::UserNotFound);
                tracing::error!("Password reset error: {}", error);
                error
            })
    }

    /// Persist a partial profile update and fold it into the cached profile
    pub async fn update_profile(&self, updates: Map<String, Value>) -> Result<Profile, SessionError> {
        let Some(user) = self.get_current_user().await else {
            tracing::error!("Update profile error: not authenticated");
            return Err(SessionError::NotAuthenticated);
        };

        let updated = self
            .data
            .from(self.settings.profile_collection.as_str())
            .update(Value::Object(updates.clone()))
            .eq("id", user.id.as_str())
            .returning("*")
            .single()
            .execute()
            .await
            .and_then(|response| response.single::<Profile>());

        match updated {
            Ok(profile) => {
                self.cache.merge(&updates);
                Ok(profile)
            }
            Err(e) => {
                tracing::error!("Update profile error: {}", e);
                Err(e.into())
            }
        }
    }

    /// Forward backend auth events to `callback` until unsubscribed
    pub fn on_auth_state_change<F>(&self, callback: F) -> AuthSubscription
    where
        F: Fn(AuthEvent, Option<Session>) + Send + Sync + 'static,
    {
        AuthSubscription::spawn(self.auth.subscribe(), callback)
    }
}
