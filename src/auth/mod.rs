//! Authentication for the Search Console API
//!
//! `AuthProvider` is the seam the performance service consults before every
//! upstream call. `CredentialAuth` implements it with an explicit state
//! machine: the client is built once (`Uninitialized -> Ready | Failed`) and
//! only rebuilt when `reload()` is called.

pub mod service_account;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::AuthSettings;
use crate::data::{http_client, ApiError, SearchConsoleApi, SearchConsoleClient};

pub use service_account::{ServiceAccountKey, ServiceAccountTokens, SEARCH_CONSOLE_SCOPE};

/// Environment variable consulted when nothing is configured
pub const ACCESS_TOKEN_ENV: &str = "GSCDATA_ACCESS_TOKEN";

/// Errors that can occur while building an authenticated client
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were configured anywhere
    #[error("No credentials configured (set auth.service_account_file, auth.service_account_json, auth.access_token, auth.access_token_file or GSCDATA_ACCESS_TOKEN)")]
    MissingCredentials,

    /// A credentials file could not be read
    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured token is blank
    #[error("Access token is empty")]
    EmptyToken,

    /// The service account key is not valid JSON or lacks required fields
    #[error("Invalid service account JSON: {0}")]
    InvalidServiceAccount(#[source] serde_json::Error),

    #[error("Service account JSON is missing {0}")]
    MissingServiceAccountField(&'static str),

    /// The service account's private key is not a usable RSA key
    #[error("Invalid service account private key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),

    /// The HTTP client could not be constructed
    #[error("Failed to create Search Console client: {0}")]
    Client(#[from] ApiError),
}

/// Provides an authenticated upstream client, if one can be had
pub trait AuthProvider: Send + Sync {
    /// Returns the client, or `None` when not authenticated
    fn client(&self) -> Option<Arc<dyn SearchConsoleApi>>;

    fn is_authenticated(&self) -> bool {
        self.client().is_some()
    }

    /// Re-reads credentials and rebuilds the client; stateless providers ignore it
    fn reload(&self) {}
}

/// Credentials read from a `CredentialSource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A ready-made OAuth access token
    AccessToken(String),
    ServiceAccount(ServiceAccountKey),
}

/// Where credentials are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ServiceAccountJson(String),
    ServiceAccountFile(PathBuf),
    Inline(String),
    File(PathBuf),
    Env(String),
}

impl CredentialSource {
    /// Picks the configured source
    ///
    /// Service account JSON, then a service account file, then an inline
    /// token, then a token file, then the environment.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        if let Some(json) = &settings.service_account_json {
            return CredentialSource::ServiceAccountJson(json.clone());
        }
        if let Some(path) = &settings.service_account_file {
            return CredentialSource::ServiceAccountFile(path.clone());
        }
        if let Some(token) = &settings.access_token {
            return CredentialSource::Inline(token.clone());
        }
        if let Some(path) = &settings.access_token_file {
            return CredentialSource::File(path.clone());
        }
        CredentialSource::Env(ACCESS_TOKEN_ENV.to_string())
    }

    /// Reads and validates the current credentials
    pub fn load(&self) -> Result<Credentials, AuthError> {
        let raw_token = match self {
            CredentialSource::ServiceAccountJson(json) => {
                return ServiceAccountKey::from_json(json).map(Credentials::ServiceAccount);
            }
            CredentialSource::ServiceAccountFile(path) => {
                let json = read_credentials_file(path)?;
                return ServiceAccountKey::from_json(&json).map(Credentials::ServiceAccount);
            }
            CredentialSource::Inline(token) => token.clone(),
            CredentialSource::File(path) => read_credentials_file(path)?,
            CredentialSource::Env(var) => {
                std::env::var(var).map_err(|_| AuthError::MissingCredentials)?
            }
        };

        let token = raw_token.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Credentials::AccessToken(token.to_string()))
    }
}

fn read_credentials_file(path: &Path) -> Result<String, AuthError> {
    std::fs::read_to_string(path).map_err(|source| AuthError::CredentialsFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds a client for the real API from loaded credentials
pub fn connect(credentials: Credentials) -> Result<Arc<dyn SearchConsoleApi>, AuthError> {
    let http = http_client()?;
    let client = match credentials {
        Credentials::AccessToken(token) => SearchConsoleClient::with_client(http, token),
        Credentials::ServiceAccount(key) => {
            let tokens = ServiceAccountTokens::new(&key, http.clone())?;
            tracing::debug!(client_email = %key.client_email, "Using service account credentials");
            SearchConsoleClient::with_token_source(http, Arc::new(tokens))
        }
    };
    Ok(Arc::new(client))
}

/// Lifecycle of the authenticated client
#[derive(Clone)]
pub enum AuthState {
    Uninitialized,
    Ready(Arc<dyn SearchConsoleApi>),
    Failed(String),
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::Uninitialized => f.write_str("Uninitialized"),
            AuthState::Ready(_) => f.write_str("Ready"),
            AuthState::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

type Connector = dyn Fn(Credentials) -> Result<Arc<dyn SearchConsoleApi>, AuthError> + Send + Sync;

/// Credential-based authentication with a build-once client
pub struct CredentialAuth {
    source: CredentialSource,
    connector: Box<Connector>,
    state: Mutex<AuthState>,
}

impl CredentialAuth {
    /// Authenticates against the real Search Console API
    pub fn new(source: CredentialSource) -> Self {
        Self::with_connector(source, connect)
    }

    /// Uses `connector` to turn credentials into a client
    pub fn with_connector<F>(source: CredentialSource, connector: F) -> Self
    where
        F: Fn(Credentials) -> Result<Arc<dyn SearchConsoleApi>, AuthError> + Send + Sync + 'static,
    {
        Self {
            source,
            connector: Box::new(connector),
            state: Mutex::new(AuthState::Uninitialized),
        }
    }

    /// Current state, without triggering initialization
    pub fn state(&self) -> AuthState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Drops the current client and rebuilds it from freshly read credentials
    pub fn reload(&self) -> AuthState {
        let next = self.initialize();
        if let Ok(mut state) = self.state.lock() {
            *state = next.clone();
        }
        next
    }

    fn initialize(&self) -> AuthState {
        let result = self.source.load().and_then(|credentials| (self.connector)(credentials));
        match result {
            Ok(client) => {
                tracing::debug!("Search Console client initialized");
                AuthState::Ready(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Search Console client unavailable");
                AuthState::Failed(e.to_string())
            }
        }
    }
}

impl AuthProvider for CredentialAuth {
    fn client(&self) -> Option<Arc<dyn SearchConsoleApi>> {
        let mut state = self.state.lock().ok()?;
        if matches!(*state, AuthState::Uninitialized) {
            *state = self.initialize();
        }
        match &*state {
            AuthState::Ready(client) => Some(client.clone()),
            AuthState::Uninitialized | AuthState::Failed(_) => None,
        }
    }

    fn reload(&self) {
        CredentialAuth::reload(self);
    }
}
