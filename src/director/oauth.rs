// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! OAuth2 client-credentials token source for the Director.
//!
//! Access tokens are cached and reused until shortly before they expire, so a
//! burst of reconciliations costs a single round trip to the token endpoint.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::constants::OAUTH_TOKEN_EXPIRY_MARGIN_SECS;
use crate::errors::DirectorError;
use crate::reconcilers::retry::is_retryable_http_status;

const OP_FETCH_TOKEN: &str = "fetchOAuthToken";

/// Client credentials for the Director's OAuth2 token endpoint.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tokens_endpoint: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tokens_endpoint", &self.tokens_endpoint)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(OAUTH_TOKEN_EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Fetches and caches Director access tokens.
pub struct OAuthTokenSource {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    tokens_endpoint: Url,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenSource {
    /// Build a token source from credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokens endpoint is not a valid URL.
    pub fn new(http: reqwest::Client, credentials: OAuthCredentials) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            tokens_endpoint: Url::parse(&credentials.tokens_endpoint)?,
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid access token, fetching a new one if the cached token is
    /// missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns a transient error for network failures and retryable HTTP statuses,
    /// and a permanent error when the endpoint rejects the credentials.
    pub async fn access_token(&self) -> Result<String, DirectorError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let fetched = self.fetch().await?;
        let access_token = fetched.access_token.clone();
        *cached = Some(fetched);
        Ok(access_token)
    }

    async fn fetch(&self) -> Result<CachedToken, DirectorError> {
        debug!(endpoint = %self.tokens_endpoint, "Fetching Director access token");

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .finish();

        let response = self
            .http
            .post(self.tokens_endpoint.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| DirectorError::transient(OP_FETCH_TOKEN, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("token endpoint returned HTTP {status}");
            return Err(if is_retryable_http_status(status) {
                DirectorError::transient(OP_FETCH_TOKEN, message)
            } else {
                DirectorError::permanent(OP_FETCH_TOKEN, message)
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectorError::permanent(OP_FETCH_TOKEN, e.to_string()))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod oauth_tests;
