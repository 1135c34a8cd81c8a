use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::{Result, anyhow};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ureq::Agent;

#[cfg(test)]
use mockall::automock;

use crate::config::AuthConfig;

/// Refresh this long before the literal expiry instant
pub const SAFETY_MARGIN_SECS: i64 = 30;
/// How many times a refresh is attempted before giving up
pub const REFRESH_ATTEMPTS: u32 = 3;

const DEFAULT_RETRY_DELAY: StdDuration = StdDuration::from_secs(1);
const TOKEN_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// An externally issued access credential for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// A credential that expires immediately, so the first authorized call
    /// exchanges the refresh token for a real access token
    pub fn bootstrap(user_id: &str, refresh_token: &str) -> Self {
        Credential {
            user_id: user_id.to_string(),
            access_token: String::new(),
            refresh_token: refresh_token.to_string(),
            scope: None,
            expires_at: Utc::now(),
        }
    }

    /// Usable without a refresh once the safety margin is subtracted
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == CredentialState::Valid
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> CredentialState {
        if now < self.expires_at - Duration::seconds(SAFETY_MARGIN_SECS) {
            CredentialState::Valid
        } else {
            CredentialState::Expiring
        }
    }
}

/// Where a credential sits in its refresh lifecycle. `Valid` and `Expiring`
/// are observable from a credential alone; the remaining states describe an
/// in-flight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Valid,
    Expiring,
    Refreshing,
    Refreshed,
    RefreshFailed,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no stored credential for user '{0}'")]
    NotFound(String),
    #[error("credential refresh failed after {attempts} attempts: {last_error}")]
    RefreshFailed { attempts: u32, last_error: String },
    #[error("credential store error: {0}")]
    Store(String),
}

/// Persistence for credentials, keyed by user identity
#[cfg_attr(test, automock)]
pub trait CredentialStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
}

/// Exchanges a refresh token for a new access token
#[cfg_attr(test, automock)]
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// What the token endpoint returns on a successful exchange. Providers that
/// omit `expires_in` get the customary hour; a rotated refresh token replaces
/// the stored one when present.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

/// In-process credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        store
            .credentials
            .lock()
            .unwrap()
            .insert(credential.user_id.clone(), credential);
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, user_id: &str) -> Result<Option<Credential>> {
        Ok(self.credentials.lock().unwrap().get(user_id).cloned())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }
}

/// Token endpoint client using the standard refresh-token grant with HTTP
/// Basic client authentication
pub struct HttpTokenRefresher {
    agent: Agent,
    token_url: String,
    authorization: String,
}

impl HttpTokenRefresher {
    pub fn new(config: &AuthConfig) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", config.client_id, config.client_secret).as_bytes());
        HttpTokenRefresher {
            agent: Agent::new(),
            token_url: config.token_url.clone(),
            authorization: format!("Basic {encoded}"),
        }
    }
}

impl TokenRefresher for HttpTokenRefresher {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .agent
            .post(&self.token_url)
            .timeout(TOKEN_TIMEOUT)
            .set("Authorization", &self.authorization)
            .send_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .map_err(|e| anyhow!("token endpoint request failed: {}", e))?;

        let grant: TokenGrant = response
            .into_json()
            .map_err(|e| anyhow!("failed to parse token response: {}", e))?;
        Ok(grant)
    }
}

/// Keeps credentials usable: hands back fresh ones untouched and refreshes
/// expiring ones with bounded retries, persisting the result before any
/// authorized call proceeds. Refreshes are serialized per user so concurrent
/// callers never race two divergent tokens into the store.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    retry_delay: StdDuration,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        CredentialManager {
            store,
            refresher,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the fixed inter-attempt delay (tests use zero)
    pub fn with_retry_delay(mut self, delay: StdDuration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Return a credential guaranteed fresh for at least the safety margin.
    /// The fresh case takes no lock; the expiring case serializes per user,
    /// re-reads the store in case a concurrent caller already refreshed, and
    /// only then exchanges the refresh token.
    pub fn ensure_valid(&self, user_id: &str) -> Result<Credential, CredentialError> {
        let credential = self.load(user_id)?;
        if credential.is_fresh(Utc::now()) {
            return Ok(credential);
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();

        let credential = self.load(user_id)?;
        if credential.is_fresh(Utc::now()) {
            log::debug!("credential for '{user_id}' was refreshed by a concurrent caller");
            return Ok(credential);
        }

        log::info!(
            "credential for '{user_id}': {:?} -> {:?}",
            CredentialState::Expiring,
            CredentialState::Refreshing
        );
        self.refresh_with_retries(credential)
    }

    fn load(&self, user_id: &str) -> Result<Credential, CredentialError> {
        self.store
            .get(user_id)
            .map_err(|e| CredentialError::Store(e.to_string()))?
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap();
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    fn refresh_with_retries(&self, credential: Credential) -> Result<Credential, CredentialError> {
        let mut last_error = String::new();
        for attempt in 1..=REFRESH_ATTEMPTS {
            match self.refresher.refresh(&credential.refresh_token) {
                Ok(grant) => {
                    let refreshed = apply_grant(&credential, grant, Utc::now());
                    // Persist before the caller proceeds on the new token
                    self.store
                        .save(&refreshed)
                        .map_err(|e| CredentialError::Store(e.to_string()))?;
                    log::info!(
                        "credential for '{}': {:?} -> {:?} (attempt {}/{})",
                        credential.user_id,
                        CredentialState::Refreshing,
                        CredentialState::Refreshed,
                        attempt,
                        REFRESH_ATTEMPTS
                    );
                    return Ok(refreshed);
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "refresh attempt {}/{} for '{}' failed: {}",
                        attempt,
                        REFRESH_ATTEMPTS,
                        credential.user_id,
                        last_error
                    );
                    if attempt < REFRESH_ATTEMPTS {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        log::error!(
            "credential for '{}': {:?} -> {:?}",
            credential.user_id,
            CredentialState::Refreshing,
            CredentialState::RefreshFailed
        );
        Err(CredentialError::RefreshFailed {
            attempts: REFRESH_ATTEMPTS,
            last_error,
        })
    }
}

/// Fold a token grant into the stored credential, keeping the old refresh
/// token and scope when the endpoint does not rotate them
fn apply_grant(credential: &Credential, grant: TokenGrant, now: DateTime<Utc>) -> Credential {
    Credential {
        user_id: credential.user_id.clone(),
        access_token: grant.access_token,
        refresh_token: grant
            .refresh_token
            .unwrap_or_else(|| credential.refresh_token.clone()),
        scope: grant.scope.or_else(|| credential.scope.clone()),
        expires_at: now + Duration::seconds(grant.expires_in as i64),
    }
}
