//! Bearer credential management
//!
//! Tokens are obtained with the OAuth2 client-credentials grant. Expiry is
//! not tracked: a token is used until the catalog answers 401, at which
//! point the search client calls [`Credentials::refresh`].

use crate::catalog::http::build_http_client;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const TOKEN_PATH: &str = "/oauth/token";

/// Token endpoint errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Token endpoint returned {0}: {1}")]
    Rejected(u16, String),

    #[error("Token response carried no access_token")]
    MissingToken,
}

/// Source of fresh bearer tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Obtain a new token (single attempt, no internal retry)
    async fn acquire(&self) -> Result<String, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Client-credentials grant against the catalog's token endpoint
pub struct OAuthTokenSource {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl OAuthTokenSource {
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http_client =
            build_http_client(timeout).map_err(|e| AuthError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            token_url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: scope.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn acquire(&self) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected(status.as_u16(), error_text));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)
    }
}

/// The run's current bearer token plus the means to replace it
///
/// Owned by the pipeline and lent mutably to the search client; this is the
/// only state shared between remote calls.
pub struct Credentials {
    source: Arc<dyn TokenSource>,
    token: String,
    refreshes: u32,
}

impl Credentials {
    /// Acquire the initial token
    pub async fn authenticate(source: Arc<dyn TokenSource>) -> Result<Self, AuthError> {
        let token = source.acquire().await?;
        tracing::info!("Access token acquired");
        Ok(Self {
            source,
            token,
            refreshes: 0,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Number of successful refreshes this run
    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }

    /// Replace the token; on failure the old token is kept
    pub async fn refresh(&mut self) -> Result<(), AuthError> {
        tracing::info!("Access token rejected, re-authenticating");
        match self.source.acquire().await {
            Ok(token) => {
                self.token = token;
                self.refreshes += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Hands out `token-1`, `token-2`, ... and fails once `fail_after` is reached
    struct CountingSource {
        calls: AtomicU32,
        fail_after: u32,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn acquire(&self) -> Result<String, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.fail_after {
                return Err(AuthError::Rejected(400, "invalid_client".into()));
            }
            Ok(format!("token-{}", n))
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail_after: 10,
        });
        let mut credentials = Credentials::authenticate(source).await.unwrap();
        assert_eq!(credentials.token(), "token-1");

        credentials.refresh().await.unwrap();
        assert_eq!(credentials.token(), "token-2");
        assert_eq!(credentials.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_token() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail_after: 1,
        });
        let mut credentials = Credentials::authenticate(source).await.unwrap();

        assert!(credentials.refresh().await.is_err());
        assert_eq!(credentials.token(), "token-1");
        assert_eq!(credentials.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_authenticate_failure_is_error() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail_after: 0,
        });
        assert!(matches!(
            Credentials::authenticate(source).await,
            Err(AuthError::Rejected(400, _))
        ));
    }

    #[test]
    fn test_token_url() {
        let source = OAuthTokenSource::new(
            "https://www.ymgal.games/",
            "ymgal",
            "secret",
            "public",
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(source.token_url, "https://www.ymgal.games/oauth/token");
    }
}
