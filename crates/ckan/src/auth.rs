//! Keycloak OAuth2 password grant.
//!
//! The access token is cached and reused until shortly before it
//! expires; concurrent callers share one refresh.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::OAuthConfig;
use crate::error::CkanError;

/// Tokens are refreshed this long before their advertised expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Fetches and caches bearer tokens for the data lake.
pub struct KeycloakAuthenticator {
    client: reqwest::Client,
    config: OAuthConfig,
    token: Mutex<Option<CachedToken>>,
}

impl KeycloakAuthenticator {
    pub fn new(client: reqwest::Client, config: OAuthConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one if needed.
    pub async fn access_token(&self) -> Result<String, CkanError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let token = self.fetch().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Value for the `Authorization` header.
    pub async fn authorization_header(&self) -> Result<String, CkanError> {
        Ok(format!("Bearer {}", self.access_token().await?))
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .is_some_and(CachedToken::is_fresh)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch(&self) -> Result<CachedToken, CkanError> {
        let form = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", self.config.grant_type.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let response = self.client.post(&self.config.url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CkanError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS);
        tracing::debug!(
            username = %self.config.username,
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            expires_in = lifetime,
            "Obtained data lake access token"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_honours_margin() {
        let soon = CachedToken {
            access_token: "a".into(),
            expires_at: Instant::now() + Duration::from_secs(10),
        };
        let later = CachedToken {
            access_token: "b".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(!soon.is_fresh());
        assert!(later.is_fresh());
    }

    #[test]
    fn token_response_without_expiry() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "refresh_token": "r"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert!(token.expires_in.is_none());
    }
}
