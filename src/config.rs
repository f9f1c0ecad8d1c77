// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every flag has an environment fallback so the operator can be configured
//! from a Deployment manifest without touching its arguments. The Director
//! OAuth credentials live in a separate YAML file, normally a mounted secret:
//!
//! ```yaml
//! data:
//!   client_id: compass-manager
//!   client_secret: s3cr3t
//!   tokens_endpoint: https://oauth.example.com/oauth2/token
//! ```

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::constants::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_RECONCILE_CONCURRENCY,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_SECS, DEFAULT_SHUTDOWN_GRACE_SECS,
};
use crate::director::oauth::OAuthCredentials;
use crate::reconcilers::retry::RetryPolicy;

/// Compass Manager: registers Kyma runtimes in Compass and configures their runtime agent.
#[derive(Clone, Debug, Parser)]
#[command(name = "compass-manager", version, about)]
pub struct Config {
    /// Director GraphQL endpoint
    #[arg(long, env = "DIRECTOR_URL")]
    pub director_url: String,

    /// YAML file with the Director OAuth client credentials
    #[arg(long, env = "DIRECTOR_OAUTH_PATH")]
    pub director_oauth_path: PathBuf,

    /// Substring every connector URL returned by the Director must contain
    #[arg(long, env = "CONNECTOR_URL_PATTERN")]
    pub connector_url_pattern: String,

    /// Attempts per Director call or target-cluster write
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    pub retry_attempts: u32,

    /// Fixed delay between attempts, in seconds
    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    pub retry_delay_secs: u64,

    /// Deadline for a single external call, in seconds
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub call_timeout_secs: u64,

    /// Concurrent reconciliations per controller
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = DEFAULT_RECONCILE_CONCURRENCY)]
    pub concurrency: u16,

    /// Listen address for `/metrics` and `/healthz`
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: SocketAddr,

    /// Grace period for in-flight reconciliations at shutdown, in seconds
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,
}

impl Config {
    /// Check values clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            bail!("--retry-attempts must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        if self.connector_url_pattern.trim().is_empty() {
            bail!("--connector-url-pattern must not be empty");
        }
        self.director_endpoint()?;
        Ok(())
    }

    /// Parsed Director endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if `--director-url` is not a valid URL.
    pub fn director_endpoint(&self) -> Result<Url> {
        Url::parse(&self.director_url)
            .with_context(|| format!("--director-url '{}' is not a valid URL", self.director_url))
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Deserialize)]
struct OAuthCredentialsFile {
    data: OAuthCredentials,
}

/// Load the Director OAuth credentials from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a field is empty, or
/// the tokens endpoint is not a valid URL.
pub fn load_oauth_credentials(path: &Path) -> Result<OAuthCredentials> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read OAuth credentials from {}", path.display()))?;
    let file: OAuthCredentialsFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse OAuth credentials in {}", path.display()))?;
    let credentials = file.data;

    if credentials.client_id.is_empty() {
        bail!("OAuth credentials in {}: client_id is empty", path.display());
    }
    if credentials.client_secret.is_empty() {
        bail!("OAuth credentials in {}: client_secret is empty", path.display());
    }
    Url::parse(&credentials.tokens_endpoint).with_context(|| {
        format!(
            "OAuth credentials in {}: tokens_endpoint '{}' is not a valid URL",
            path.display(),
            credentials.tokens_endpoint
        )
    })?;

    Ok(credentials)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
