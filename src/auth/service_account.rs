//! Service-account tokens for the Search Console API
//!
//! A Google service-account key signs a short-lived RS256 assertion, which
//! the token endpoint exchanges for an access token. Tokens are reused until
//! shortly before they expire.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::AuthError;
use crate::data::{ApiError, TokenSource};

/// Read-only access to Search Console data
pub const SEARCH_CONSOLE_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion (Google's maximum)
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key file that signing needs
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parses a key file's contents, requiring `client_email` and `private_key`
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).map_err(AuthError::InvalidServiceAccount)?;
        if key.client_email.trim().is_empty() {
            return Err(AuthError::MissingServiceAccountField("client_email"));
        }
        if key.private_key.trim().is_empty() {
            return Err(AuthError::MissingServiceAccountField("private_key"));
        }
        Ok(key)
    }
}

/// Claims of the assertion sent to the token endpoint
#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches access tokens for one service account
pub struct ServiceAccountTokens {
    client: Client,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    /// Fails if the private key is not a valid RSA PEM
    pub fn new(key: &ServiceAccountKey, client: Client) -> Result<Self, AuthError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(AuthError::InvalidPrivateKey)?;
        Ok(Self {
            client,
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            signing_key,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: SEARCH_CONSOLE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, ApiError> {
        let assertion = self.assertion(now).map_err(|e| ApiError::Api {
            status: StatusCode::UNAUTHORIZED.as_u16(),
            message: format!("Failed to sign service account assertion: {}", e),
        })?;

        tracing::debug!(
            client_email = %self.client_email,
            "Requesting service account access token"
        );
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_token_response(status, &body, now)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Turns a token endpoint response into a token, or an `ApiError`
///
/// A rejected grant is reported as 401 so it is classified as a permission
/// problem.
fn parse_token_response(
    status: StatusCode,
    body: &str,
    now: DateTime<Utc>,
) -> Result<CachedToken, ApiError> {
    if !status.is_success() {
        let message = serde_json::from_str::<TokenErrorResponse>(body)
            .map(|e| match e.error_description {
                Some(description) => format!("{}: {}", e.error, description),
                None => e.error,
            })
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });
        let status = if status == StatusCode::BAD_REQUEST {
            StatusCode::UNAUTHORIZED
        } else {
            status
        };
        return Err(ApiError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let response: TokenResponse = serde_json::from_str(body)?;
    let lifetime = response
        .expires_in
        .unwrap_or(ASSERTION_LIFETIME_SECS)
        .clamp(0, ASSERTION_LIFETIME_SECS);
    Ok(CachedToken {
        value: response.access_token,
        expires_at: now + Duration::seconds(lifetime),
    })
}
