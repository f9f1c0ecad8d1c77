// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only access to the control plane: Kyma resources and the credentials
//! secrets that carry each runtime's kubeconfig.
//!
//! Reads are never retried here. A failed or timed-out read fails the
//! reconciliation and the controller requeues it.

use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::KUBECONFIG_KEY;
use crate::crd::Kyma;
use crate::labels::LABEL_KYMA_NAME;
use crate::reconcilers::retry::with_deadline;

#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch a Kyma, `None` if it does not exist.
    async fn get_kyma(&self, namespace: &str, name: &str) -> Result<Option<Kyma>, kube::Error>;

    /// Kubeconfig of the runtime paired with `kyma_name`, `None` while its
    /// credentials secret is absent.
    async fn find_kubeconfig(
        &self,
        namespace: &str,
        kyma_name: &str,
    ) -> Result<Option<Vec<u8>>, kube::Error>;
}

/// Extract the kubeconfig from the first usable credentials secret.
///
/// A secret without a non-empty `config` key is treated as absent.
#[must_use]
pub fn kubeconfig_from_secrets(secrets: &[Secret]) -> Option<Vec<u8>> {
    if secrets.len() > 1 {
        warn!(
            count = secrets.len(),
            "More than one credentials secret matches; using the first"
        );
    }

    let secret = secrets.first()?;
    let kubeconfig = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_KEY))
        .map(|bytes| bytes.0.clone())
        .filter(|bytes| !bytes.is_empty());

    if kubeconfig.is_none() {
        debug!(
            secret = %secret.name_any(),
            key = KUBECONFIG_KEY,
            "Credentials secret has no kubeconfig yet"
        );
    }
    kubeconfig
}

/// [`ControlPlane`] backed by the control-plane API server.
///
/// Each call is bounded by `call_timeout`. The shared client keeps its long
/// read timeout for the watches.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    call_timeout: Duration,
}

impl KubeControlPlane {
    #[must_use]
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_kyma(&self, namespace: &str, name: &str) -> Result<Option<Kyma>, kube::Error> {
        let api: Api<Kyma> = Api::namespaced(self.client.clone(), namespace);
        with_deadline(self.call_timeout, api.get_opt(name)).await
    }

    async fn find_kubeconfig(
        &self,
        namespace: &str,
        kyma_name: &str,
    ) -> Result<Option<Vec<u8>>, kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{LABEL_KYMA_NAME}={kyma_name}");
        let params = ListParams::default().labels(&selector);
        let secrets = with_deadline(self.call_timeout, api.list(&params)).await?;
        Ok(kubeconfig_from_secrets(&secrets.items))
    }
}

#[cfg(test)]
#[path = "control_plane_tests.rs"]
mod control_plane_tests;
