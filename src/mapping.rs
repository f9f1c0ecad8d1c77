// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mapping Store: named operations over `CompassManagerMapping` resources.
//!
//! Every write is guarded by the mapping's current resource version. A concurrent
//! change surfaces as [`StoreError::Conflict`] and the caller requeues; nothing is
//! retried here. There is no cache beyond what the controller's watcher keeps.

use kube::api::{DeleteParams, Patch, PatchParams, PostParams, Preconditions};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::crd::{
    CompassManagerMapping, CompassManagerMappingSpec, CompassManagerMappingStatus, Kyma,
};
use crate::errors::StoreError;
use crate::labels::{
    FINALIZER_COMPASS_MAPPING, K8S_MANAGED_BY, LABEL_KYMA_NAME, LABEL_MAPPING_GLOBAL_ACCOUNT_ID,
    LABEL_MAPPING_SHOOT_NAME, MANAGED_BY_COMPASS_MANAGER,
};
use crate::reconcilers::finalizers;
use crate::reconcilers::retry::with_deadline;

/// CRUD over `CompassManagerMapping`, keyed by the `(namespace, name)` of its Kyma.
#[async_trait::async_trait]
pub trait MappingStore: Send + Sync {
    /// Fetch the mapping paired with a Kyma, `None` if it does not exist.
    async fn get_by_kyma(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CompassManagerMapping>, StoreError>;

    /// Create a mapping; [`StoreError::AlreadyExists`] if one is already there.
    async fn create(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError>;

    /// Merge `labels` into the mapping's labels.
    async fn set_labels(
        &self,
        mapping: &CompassManagerMapping,
        labels: &BTreeMap<String, String>,
    ) -> Result<CompassManagerMapping, StoreError>;

    /// Replace the mapping's status.
    async fn set_status(
        &self,
        mapping: &CompassManagerMapping,
        status: &CompassManagerMappingStatus,
    ) -> Result<CompassManagerMapping, StoreError>;

    async fn ensure_finalizer(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError>;

    async fn remove_finalizer(&self, mapping: &CompassManagerMapping) -> Result<(), StoreError>;

    /// Delete the mapping, guarded by its resource version.
    ///
    /// Returns the mapping while a finalizer still holds it, `None` once it is
    /// gone. A mapping that is already gone counts as success.
    async fn delete(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<Option<CompassManagerMapping>, StoreError>;
}

/// Labels a fresh mapping carries, copied from its Kyma.
#[must_use]
pub fn mapping_labels(kyma: &Kyma) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            LABEL_MAPPING_GLOBAL_ACCOUNT_ID.to_string(),
            kyma.global_account_id(),
        ),
        (LABEL_KYMA_NAME.to_string(), kyma.kyma_name()),
        (LABEL_MAPPING_SHOOT_NAME.to_string(), kyma.shoot_name()),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_COMPASS_MANAGER.to_string(),
        ),
    ])
}

/// Build the mapping for a Kyma: same namespace and name, finalizer in place.
///
/// No owner reference is set. The mapping has to outlive its Kyma until the
/// runtime has been deregistered, and the finalizer holds it until then.
#[must_use]
pub fn new_mapping(kyma: &Kyma) -> CompassManagerMapping {
    let mut mapping =
        CompassManagerMapping::new(&kyma.name_any(), CompassManagerMappingSpec::default());
    mapping.metadata.namespace = kyma.namespace();
    mapping.metadata.labels = Some(mapping_labels(kyma));
    mapping.metadata.finalizers = Some(vec![FINALIZER_COMPASS_MAPPING.to_string()]);
    mapping
}

/// Delete options guarded by the mapping's resource version and UID.
#[must_use]
pub fn delete_params(mapping: &CompassManagerMapping) -> DeleteParams {
    DeleteParams {
        preconditions: Some(Preconditions {
            resource_version: mapping.resource_version(),
            uid: mapping.uid(),
        }),
        ..DeleteParams::default()
    }
}

/// [`MappingStore`] backed by the control-plane API server.
///
/// Each call is bounded by `call_timeout`.
#[derive(Clone)]
pub struct KubeMappingStore {
    client: Client,
    call_timeout: Duration,
}

impl KubeMappingStore {
    #[must_use]
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    fn api(&self, namespace: &str) -> Api<CompassManagerMapping> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn key_of(mapping: &CompassManagerMapping) -> (String, String) {
    (mapping.namespace().unwrap_or_default(), mapping.name_any())
}

#[async_trait::async_trait]
impl MappingStore for KubeMappingStore {
    async fn get_by_kyma(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CompassManagerMapping>, StoreError> {
        let api = self.api(namespace);
        Ok(with_deadline(self.call_timeout, api.get_opt(name)).await?)
    }

    async fn create(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError> {
        let (namespace, name) = key_of(mapping);
        debug!(namespace = %namespace, name = %name, "Creating CompassManagerMapping");
        let api = self.api(&namespace);
        with_deadline(self.call_timeout, api.create(&PostParams::default(), mapping))
            .await
            .map_err(|e| StoreError::from_write(e, &namespace, &name))
    }

    async fn set_labels(
        &self,
        mapping: &CompassManagerMapping,
        labels: &BTreeMap<String, String>,
    ) -> Result<CompassManagerMapping, StoreError> {
        let (namespace, name) = key_of(mapping);
        let patch = json!({
            "metadata": {
                "resourceVersion": mapping.resource_version(),
                "labels": labels,
            }
        });
        let api = self.api(&namespace);
        let params = PatchParams::default();
        with_deadline(
            self.call_timeout,
            api.patch(&name, &params, &Patch::Merge(&patch)),
        )
        .await
        .map_err(|e| StoreError::from_write(e, &namespace, &name))
    }

    async fn set_status(
        &self,
        mapping: &CompassManagerMapping,
        status: &CompassManagerMappingStatus,
    ) -> Result<CompassManagerMapping, StoreError> {
        let (namespace, name) = key_of(mapping);
        let patch = json!({
            "metadata": { "resourceVersion": mapping.resource_version() },
            "status": status,
        });
        let api = self.api(&namespace);
        let params = PatchParams::default();
        with_deadline(
            self.call_timeout,
            api.patch_status(&name, &params, &Patch::Merge(&patch)),
        )
        .await
        .map_err(|e| StoreError::from_write(e, &namespace, &name))
    }

    async fn ensure_finalizer(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError> {
        let (namespace, name) = key_of(mapping);
        let api = self.api(&namespace);
        with_deadline(
            self.call_timeout,
            finalizers::ensure_finalizer(&api, mapping, FINALIZER_COMPASS_MAPPING),
        )
        .await
        .map_err(|e| StoreError::from_write(e, &namespace, &name))
    }

    async fn remove_finalizer(&self, mapping: &CompassManagerMapping) -> Result<(), StoreError> {
        let (namespace, name) = key_of(mapping);
        let api = self.api(&namespace);
        match with_deadline(
            self.call_timeout,
            finalizers::remove_finalizer(&api, mapping, FINALIZER_COMPASS_MAPPING),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(StoreError::from_write(e, &namespace, &name)),
        }
    }

    async fn delete(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<Option<CompassManagerMapping>, StoreError> {
        let (namespace, name) = key_of(mapping);
        let api = self.api(&namespace);
        let params = delete_params(mapping);
        match with_deadline(self.call_timeout, api.delete(&name, &params)).await {
            // Left: still present, held by a finalizer. Right: gone.
            Ok(deleted) => Ok(deleted.left()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(e) => Err(StoreError::from_write(e, &namespace, &name)),
        }
    }
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod mapping_tests;
