// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Compass runtime agent configuration on target runtimes.
//!
//! [`RuntimeAgentConfigurator::configure`] fetches a one-time token from the
//! Director, validates it and upserts the `kyma-system/compass-agent-configuration`
//! secret on the target cluster. The runtime agent picks the secret up and uses the
//! token to establish trust with the Compass connector.
//!
//! The configurator keeps no state between calls: running it twice with the same
//! inputs and token converges on the same secret.
//!
//! Access to the target cluster goes through two seams so the reconciler can be
//! exercised without a cluster:
//! - [`TargetClusterConnector`] turns a kubeconfig blob into a secret API
//! - [`AgentSecretApi`] reads and writes the agent configuration secret

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{
    AGENT_CONFIGURATION_SECRET_NAME, CONNECTOR_URL_KEY, MAX_TOKEN_LENGTH, RUNTIME_AGENT_NAMESPACE,
    RUNTIME_ID_KEY, TARGET_CONNECT_TIMEOUT_SECS, TENANT_KEY, TOKEN_KEY,
};
use crate::director::{DirectorClient, OneTimeToken};
use crate::errors::ConfigureError;
use crate::labels::{K8S_MANAGED_BY, MANAGED_BY_COMPASS_MANAGER};
use crate::reconcilers::retry::{retry_on_error, RetryPolicy};

/// Upper bound on cached target clients before the cache is reset.
const MAX_CACHED_TARGET_CLIENTS: usize = 512;

/// Reads and writes the agent configuration secret on one target cluster.
#[async_trait::async_trait]
pub trait AgentSecretApi: Send + Sync {
    /// Fetch the secret, `None` if it does not exist.
    async fn get(&self) -> Result<Option<Secret>, kube::Error>;

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error>;

    /// Overwrite the secret unconditionally.
    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error>;
}

/// Builds access to a target cluster from a kubeconfig blob.
#[async_trait::async_trait]
pub trait TargetClusterConnector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ConfigureError::InvalidKubeconfig`] if the blob cannot be turned
    /// into a client.
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Arc<dyn AgentSecretApi>, ConfigureError>;
}

/// [`AgentSecretApi`] backed by a real Kubernetes client.
pub struct KubeAgentSecretApi {
    api: Api<Secret>,
}

impl KubeAgentSecretApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::namespaced(client, RUNTIME_AGENT_NAMESPACE),
        }
    }
}

#[async_trait::async_trait]
impl AgentSecretApi for KubeAgentSecretApi {
    async fn get(&self) -> Result<Option<Secret>, kube::Error> {
        self.api.get_opt(AGENT_CONFIGURATION_SECRET_NAME).await
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        self.api.create(&PostParams::default(), secret).await
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        self.api
            .replace(AGENT_CONFIGURATION_SECRET_NAME, &PostParams::default(), secret)
            .await
    }
}

/// Connects to target clusters from kubeconfig blobs.
///
/// Clients are cached by the SHA-256 fingerprint of the kubeconfig, so repeated
/// reconciliations of the same runtime reuse one connection pool. A rotated
/// kubeconfig has a new fingerprint and gets a fresh client.
pub struct KubeconfigConnector {
    call_timeout: Duration,
    clients: Mutex<HashMap<[u8; 32], Client>>,
}

impl KubeconfigConnector {
    #[must_use]
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn build_client(&self, kubeconfig: &[u8]) -> Result<Client, ConfigureError> {
        let raw = std::str::from_utf8(kubeconfig)
            .map_err(|e| ConfigureError::InvalidKubeconfig(format!("not UTF-8: {e}")))?;
        let parsed = Kubeconfig::from_yaml(raw)
            .map_err(|e| ConfigureError::InvalidKubeconfig(e.to_string()))?;

        let mut config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| ConfigureError::InvalidKubeconfig(e.to_string()))?;
        config.connect_timeout = Some(Duration::from_secs(TARGET_CONNECT_TIMEOUT_SECS));
        config.read_timeout = Some(self.call_timeout);
        config.write_timeout = Some(self.call_timeout);

        Client::try_from(config).map_err(|e| ConfigureError::InvalidKubeconfig(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TargetClusterConnector for KubeconfigConnector {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Arc<dyn AgentSecretApi>, ConfigureError> {
        let fingerprint: [u8; 32] = Sha256::digest(kubeconfig).into();

        let cached = self.clients.lock().await.get(&fingerprint).cloned();
        if let Some(client) = cached {
            return Ok(Arc::new(KubeAgentSecretApi::new(client)));
        }

        // Not under the cache lock
        let client = self.build_client(kubeconfig).await?;

        let mut clients = self.clients.lock().await;
        if clients.len() >= MAX_CACHED_TARGET_CLIENTS {
            debug!(size = clients.len(), "Resetting target client cache");
            clients.clear();
        }
        let client = clients.entry(fingerprint).or_insert(client).clone();

        Ok(Arc::new(KubeAgentSecretApi::new(client)))
    }
}

/// Build the agent configuration secret.
///
/// The string data holds exactly `CONNECTOR_URL`, `RUNTIME_ID`, `TENANT` and
/// `TOKEN`.
#[must_use]
pub fn agent_configuration_secret(
    token: &OneTimeToken,
    compass_id: &str,
    global_account: &str,
) -> Secret {
    let string_data = BTreeMap::from([
        (CONNECTOR_URL_KEY.to_string(), token.connector_url.clone()),
        (RUNTIME_ID_KEY.to_string(), compass_id.to_string()),
        (TENANT_KEY.to_string(), global_account.to_string()),
        (TOKEN_KEY.to_string(), token.token.clone()),
    ]);

    Secret {
        metadata: ObjectMeta {
            name: Some(AGENT_CONFIGURATION_SECRET_NAME.to_string()),
            namespace: Some(RUNTIME_AGENT_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                K8S_MANAGED_BY.to_string(),
                MANAGED_BY_COMPASS_MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        string_data: Some(string_data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Get the secret; create it when missing, overwrite it otherwise.
async fn upsert_secret(api: &dyn AgentSecretApi, secret: &Secret) -> Result<(), kube::Error> {
    if api.get().await?.is_some() {
        api.replace(secret).await?;
    } else {
        api.create(secret).await?;
    }
    Ok(())
}

/// Configures the Compass runtime agent on target runtimes.
pub struct RuntimeAgentConfigurator {
    director: Arc<dyn DirectorClient>,
    connector: Arc<dyn TargetClusterConnector>,
    connector_url_pattern: String,
    retry: RetryPolicy,
}

impl RuntimeAgentConfigurator {
    #[must_use]
    pub fn new(
        director: Arc<dyn DirectorClient>,
        connector: Arc<dyn TargetClusterConnector>,
        connector_url_pattern: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            director,
            connector,
            connector_url_pattern: connector_url_pattern.into(),
            retry,
        }
    }

    /// Write a fresh agent configuration to the runtime behind `kubeconfig`.
    ///
    /// # Errors
    ///
    /// - [`ConfigureError::InvalidKubeconfig`] if no client can be built
    /// - [`ConfigureError::Director`] if the token cannot be fetched
    /// - [`ConfigureError::ConnectorUrlMismatch`] or [`ConfigureError::InvalidToken`]
    ///   if the token fails validation
    /// - [`ConfigureError::TargetCluster`] if the secret cannot be written
    pub async fn configure(
        &self,
        kubeconfig: &[u8],
        compass_id: &str,
        global_account: &str,
    ) -> Result<(), ConfigureError> {
        let secrets = self.connector.connect(kubeconfig).await?;

        let token = retry_on_error(&self.retry, "fetch one-time token", || {
            self.director.refresh_compass_token(compass_id, global_account)
        })
        .await?;

        self.validate_token(&token)?;

        let secret = agent_configuration_secret(&token, compass_id, global_account);
        retry_on_error(&self.retry, "upsert agent configuration", || {
            upsert_secret(secrets.as_ref(), &secret)
        })
        .await?;

        info!(
            compass_id = %compass_id,
            namespace = RUNTIME_AGENT_NAMESPACE,
            secret = AGENT_CONFIGURATION_SECRET_NAME,
            "Compass runtime agent configured"
        );
        Ok(())
    }

    /// Check the connector URL pattern and the decoded token length.
    ///
    /// # Errors
    ///
    /// Returns a permanent [`ConfigureError`] if either check fails.
    pub fn validate_token(&self, token: &OneTimeToken) -> Result<(), ConfigureError> {
        if !token.connector_url.contains(&self.connector_url_pattern) {
            return Err(ConfigureError::ConnectorUrlMismatch {
                url: token.connector_url.clone(),
                pattern: self.connector_url_pattern.clone(),
            });
        }

        let decoded = STANDARD
            .decode(&token.token)
            .map_err(|e| ConfigureError::InvalidToken(format!("not valid base64: {e}")))?;
        if decoded.len() > MAX_TOKEN_LENGTH {
            return Err(ConfigureError::InvalidToken(format!(
                "decoded length {} exceeds {MAX_TOKEN_LENGTH} bytes",
                decoded.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_agent_tests.rs"]
mod runtime_agent_tests;
