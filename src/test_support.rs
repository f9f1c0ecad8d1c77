// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes of the external seams, shared by unit tests.
//!
//! The fakes follow the API server's rules closely enough for the reconciler:
//! resource versions are checked on every write, `create` refuses duplicates and
//! deleting an object with finalizers only marks it.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::context::Context;
use crate::control_plane::ControlPlane;
use crate::crd::{
    CompassManagerMapping, CompassManagerMappingStatus, Kyma, KymaSpec, KymaStatus, ModuleStatus,
};
use crate::director::{DirectorClient, OneTimeToken, RuntimeLabels};
use crate::errors::{ConfigureError, DirectorError, StoreError};
use crate::labels::{LABEL_COMPASS_ID, LABEL_GLOBAL_ACCOUNT_ID, LABEL_KYMA_NAME, LABEL_SHOOT_NAME};
use crate::mapping::MappingStore;
use crate::reconcilers::retry::RetryPolicy;
use crate::reconcilers::tracking::RuntimeKey;
use crate::runtime_agent::{AgentSecretApi, TargetClusterConnector};

pub const TEST_NAMESPACE: &str = "kcp-system";
pub const TEST_GLOBAL_ACCOUNT: &str = "ga-1";
pub const TEST_CONNECTOR_PATTERN: &str = "connector.kyma.local";

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(Box::new(kube::error::ErrorResponse {
        status: Some(kube::core::response::StatusSummary::Failure),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
        metadata: None,
        details: None,
    }))
}

pub fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).unwrap()
}

/// A Kyma labelled the way the lifecycle manager labels it.
pub fn kyma(name: &str, modules: &[(&str, &str)]) -> Kyma {
    let mut kyma = Kyma::new(name, KymaSpec::default());
    kyma.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    kyma.metadata.labels = Some(BTreeMap::from([
        (LABEL_GLOBAL_ACCOUNT_ID.to_string(), TEST_GLOBAL_ACCOUNT.to_string()),
        (LABEL_SHOOT_NAME.to_string(), format!("shoot-{name}")),
        (LABEL_KYMA_NAME.to_string(), name.to_string()),
    ]));
    kyma.status = Some(KymaStatus {
        state: None,
        modules: modules
            .iter()
            .map(|(module, state)| ModuleStatus {
                name: (*module).to_string(),
                state: (*state).to_string(),
            })
            .collect(),
    });
    kyma
}

// ============================================================================
// Director
// ============================================================================

#[derive(Default)]
pub struct FakeDirectorState {
    pub registered: Vec<RuntimeLabels>,
    pub deregistered: Vec<(String, String)>,
    pub token_requests: Vec<(String, String)>,
    pub register_failures: VecDeque<DirectorError>,
    pub deregister_failures: VecDeque<DirectorError>,
    pub token_failures: VecDeque<DirectorError>,
    pub connector_url: Option<String>,
    pub token_override: Option<String>,
}

#[derive(Default)]
pub struct FakeDirector {
    pub state: Mutex<FakeDirectorState>,
}

impl FakeDirector {
    pub fn fail_register(&self, err: DirectorError) {
        self.state.lock().unwrap().register_failures.push_back(err);
    }

    pub fn fail_deregister(&self, err: DirectorError) {
        self.state.lock().unwrap().deregister_failures.push_back(err);
    }

    pub fn fail_token(&self, err: DirectorError) {
        self.state.lock().unwrap().token_failures.push_back(err);
    }

    pub fn set_connector_url(&self, url: &str) {
        self.state.lock().unwrap().connector_url = Some(url.to_string());
    }

    pub fn set_token(&self, token: &str) {
        self.state.lock().unwrap().token_override = Some(token.to_string());
    }

    pub fn register_calls(&self) -> usize {
        self.state.lock().unwrap().registered.len()
    }

    pub fn deregister_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().deregistered.clone()
    }

    pub fn token_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().token_requests.clone()
    }
}

#[async_trait::async_trait]
impl DirectorClient for FakeDirector {
    async fn register_in_compass(&self, labels: &RuntimeLabels) -> Result<String, DirectorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.register_failures.pop_front() {
            return Err(err);
        }
        state.registered.push(labels.clone());
        Ok(format!("compass-{}-{}", labels.kyma_name, state.registered.len()))
    }

    async fn deregister_from_compass(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<(), DirectorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.deregister_failures.pop_front() {
            return Err(err);
        }
        state
            .deregistered
            .push((compass_id.to_string(), global_account.to_string()));
        Ok(())
    }

    async fn refresh_compass_token(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<OneTimeToken, DirectorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.token_failures.pop_front() {
            return Err(err);
        }
        state
            .token_requests
            .push((compass_id.to_string(), global_account.to_string()));
        let count = state.token_requests.len();
        Ok(OneTimeToken {
            connector_url: state
                .connector_url
                .clone()
                .unwrap_or_else(|| format!("https://{TEST_CONNECTOR_PATTERN}/graphql")),
            token: state
                .token_override
                .clone()
                .unwrap_or_else(|| STANDARD.encode(format!("token-{count}"))),
        })
    }
}

// ============================================================================
// Target cluster
// ============================================================================

#[derive(Default)]
pub struct FakeSecretState {
    pub secret: Option<Secret>,
    pub creates: usize,
    pub replaces: usize,
    pub get_failures: VecDeque<kube::Error>,
    pub write_failures: VecDeque<kube::Error>,
}

#[derive(Default)]
pub struct FakeSecretApi {
    pub state: Mutex<FakeSecretState>,
}

impl FakeSecretApi {
    pub fn fail_get(&self, err: kube::Error) {
        self.state.lock().unwrap().get_failures.push_back(err);
    }

    pub fn fail_write(&self, err: kube::Error) {
        self.state.lock().unwrap().write_failures.push_back(err);
    }

    pub fn secret(&self) -> Option<Secret> {
        self.state.lock().unwrap().secret.clone()
    }

    pub fn string_data(&self) -> BTreeMap<String, String> {
        self.secret()
            .and_then(|secret| secret.string_data)
            .unwrap_or_default()
    }

    pub fn writes(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.creates, state.replaces)
    }
}

#[async_trait::async_trait]
impl AgentSecretApi for FakeSecretApi {
    async fn get(&self) -> Result<Option<Secret>, kube::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.get_failures.pop_front() {
            return Err(err);
        }
        Ok(state.secret.clone())
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.write_failures.pop_front() {
            return Err(err);
        }
        if state.secret.is_some() {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.creates += 1;
        state.secret = Some(secret.clone());
        Ok(secret.clone())
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.write_failures.pop_front() {
            return Err(err);
        }
        if state.secret.is_none() {
            return Err(api_error(404, "NotFound"));
        }
        state.replaces += 1;
        state.secret = Some(secret.clone());
        Ok(secret.clone())
    }
}

/// Connector that hands out one shared [`FakeSecretApi`].
pub struct FakeConnector {
    pub secrets: Arc<FakeSecretApi>,
    pub kubeconfigs: Mutex<Vec<Vec<u8>>>,
    /// Kubeconfigs equal to this blob are rejected as unparseable
    pub invalid: Mutex<Option<Vec<u8>>>,
}

impl FakeConnector {
    pub fn new(secrets: Arc<FakeSecretApi>) -> Self {
        Self {
            secrets,
            kubeconfigs: Mutex::new(Vec::new()),
            invalid: Mutex::new(None),
        }
    }

    pub fn reject(&self, kubeconfig: &[u8]) {
        *self.invalid.lock().unwrap() = Some(kubeconfig.to_vec());
    }
}

#[async_trait::async_trait]
impl TargetClusterConnector for FakeConnector {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Arc<dyn AgentSecretApi>, ConfigureError> {
        self.kubeconfigs.lock().unwrap().push(kubeconfig.to_vec());
        if self.invalid.lock().unwrap().as_deref() == Some(kubeconfig) {
            return Err(ConfigureError::InvalidKubeconfig(
                "error loading config file: invalid YAML".to_string(),
            ));
        }
        Ok(Arc::clone(&self.secrets) as Arc<dyn AgentSecretApi>)
    }
}

// ============================================================================
// Control plane
// ============================================================================

#[derive(Default)]
pub struct FakeControlPlane {
    pub kymas: Mutex<HashMap<RuntimeKey, Kyma>>,
    pub credentials: Mutex<HashMap<RuntimeKey, Vec<u8>>>,
}

impl FakeControlPlane {
    pub fn put_kyma(&self, kyma: Kyma) {
        let key = RuntimeKey::new(kyma.namespace().unwrap_or_default(), kyma.name_any());
        self.kymas.lock().unwrap().insert(key, kyma);
    }

    pub fn remove_kyma(&self, name: &str) {
        self.kymas
            .lock()
            .unwrap()
            .remove(&RuntimeKey::new(TEST_NAMESPACE, name));
    }

    pub fn mark_kyma_deleted(&self, name: &str) {
        if let Some(kyma) = self
            .kymas
            .lock()
            .unwrap()
            .get_mut(&RuntimeKey::new(TEST_NAMESPACE, name))
        {
            kyma.metadata.deletion_timestamp = Some(deletion_time());
        }
    }

    /// Add a credentials secret for the Kyma named `kyma_name`.
    pub fn put_credentials(&self, kyma_name: &str, kubeconfig: &[u8]) {
        self.credentials
            .lock()
            .unwrap()
            .insert(RuntimeKey::new(TEST_NAMESPACE, kyma_name), kubeconfig.to_vec());
    }
}

#[async_trait::async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_kyma(&self, namespace: &str, name: &str) -> Result<Option<Kyma>, kube::Error> {
        Ok(self
            .kymas
            .lock()
            .unwrap()
            .get(&RuntimeKey::new(namespace, name))
            .cloned())
    }

    async fn find_kubeconfig(
        &self,
        namespace: &str,
        kyma_name: &str,
    ) -> Result<Option<Vec<u8>>, kube::Error> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .get(&RuntimeKey::new(namespace, kyma_name))
            .cloned())
    }
}

// ============================================================================
// Mapping store
// ============================================================================

#[derive(Default)]
pub struct FakeMappingState {
    pub mappings: HashMap<RuntimeKey, CompassManagerMapping>,
    pub next_version: u64,
    pub writes: usize,
    /// Every non-empty compass-id value a write left on a mapping
    pub compass_id_history: Vec<String>,
    pub label_failures: VecDeque<StoreError>,
    pub status_failures: VecDeque<StoreError>,
    pub delete_failures: VecDeque<StoreError>,
}

#[derive(Default)]
pub struct FakeMappingStore {
    pub state: Mutex<FakeMappingState>,
}

fn key_of(mapping: &CompassManagerMapping) -> RuntimeKey {
    RuntimeKey::new(mapping.namespace().unwrap_or_default(), mapping.name_any())
}

fn conflict(key: &RuntimeKey) -> StoreError {
    StoreError::Conflict {
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    }
}

impl FakeMappingState {
    fn bump(&mut self, mapping: &mut CompassManagerMapping) {
        self.next_version += 1;
        self.writes += 1;
        mapping.metadata.resource_version = Some(self.next_version.to_string());
        if let Some(id) = mapping.compass_id() {
            self.compass_id_history.push(id.to_string());
        }
    }

    /// Fetch the stored mapping, checking the caller's resource version.
    fn current(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError> {
        let key = key_of(mapping);
        let stored = self.mappings.get(&key).ok_or_else(|| {
            StoreError::Kube(api_error(404, "NotFound"))
        })?;
        if stored.resource_version() != mapping.resource_version() {
            return Err(conflict(&key));
        }
        Ok(stored.clone())
    }

    fn store(&mut self, mut mapping: CompassManagerMapping) -> CompassManagerMapping {
        self.bump(&mut mapping);
        self.mappings.insert(key_of(&mapping), mapping.clone());
        mapping
    }
}

impl FakeMappingStore {
    pub fn get(&self, name: &str) -> Option<CompassManagerMapping> {
        self.state
            .lock()
            .unwrap()
            .mappings
            .get(&RuntimeKey::new(TEST_NAMESPACE, name))
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().mappings.len()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn compass_id_history(&self) -> Vec<String> {
        self.state.lock().unwrap().compass_id_history.clone()
    }

    pub fn fail_labels(&self, err: StoreError) {
        self.state.lock().unwrap().label_failures.push_back(err);
    }

    pub fn fail_status(&self, err: StoreError) {
        self.state.lock().unwrap().status_failures.push_back(err);
    }

    pub fn fail_delete(&self, err: StoreError) {
        self.state.lock().unwrap().delete_failures.push_back(err);
    }

    /// Insert a mapping as-is, e.g. one left behind by an earlier process.
    pub fn seed(&self, mapping: CompassManagerMapping) {
        let mut state = self.state.lock().unwrap();
        state.store(mapping);
    }

    /// Mark a mapping for deletion the way the API server does.
    pub fn mark_deleted(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let key = RuntimeKey::new(TEST_NAMESPACE, name);
        if let Some(mut mapping) = state.mappings.get(&key).cloned() {
            mapping.metadata.deletion_timestamp = Some(deletion_time());
            state.store(mapping);
        }
    }
}

#[async_trait::async_trait]
impl MappingStore for FakeMappingStore {
    async fn get_by_kyma(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CompassManagerMapping>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .mappings
            .get(&RuntimeKey::new(namespace, name))
            .cloned())
    }

    async fn create(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = key_of(mapping);
        if state.mappings.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: key.namespace,
                name: key.name,
            });
        }
        Ok(state.store(mapping.clone()))
    }

    async fn set_labels(
        &self,
        mapping: &CompassManagerMapping,
        labels: &BTreeMap<String, String>,
    ) -> Result<CompassManagerMapping, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.label_failures.pop_front() {
            return Err(err);
        }
        let mut current = state.current(mapping)?;
        current
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
        Ok(state.store(current))
    }

    async fn set_status(
        &self,
        mapping: &CompassManagerMapping,
        status: &CompassManagerMappingStatus,
    ) -> Result<CompassManagerMapping, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.status_failures.pop_front() {
            return Err(err);
        }
        let mut current = state.current(mapping)?;
        current.status = Some(status.clone());
        Ok(state.store(current))
    }

    async fn ensure_finalizer(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<CompassManagerMapping, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut current = state.current(mapping)?;
        if current.has_finalizer(crate::labels::FINALIZER_COMPASS_MAPPING) {
            return Ok(current);
        }
        current
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(crate::labels::FINALIZER_COMPASS_MAPPING.to_string());
        Ok(state.store(current))
    }

    async fn remove_finalizer(&self, mapping: &CompassManagerMapping) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = key_of(mapping);
        if !state.mappings.contains_key(&key) {
            return Ok(());
        }
        let mut current = state.current(mapping)?;
        if let Some(finalizers) = current.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != crate::labels::FINALIZER_COMPASS_MAPPING);
        }
        if current.is_being_deleted() && current.finalizers().is_empty() {
            state.mappings.remove(&key);
            state.writes += 1;
        } else {
            state.store(current);
        }
        Ok(())
    }

    async fn delete(
        &self,
        mapping: &CompassManagerMapping,
    ) -> Result<Option<CompassManagerMapping>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }
        let key = key_of(mapping);
        if !state.mappings.contains_key(&key) {
            return Ok(None);
        }
        let mut current = state.current(mapping)?;
        if current.finalizers().is_empty() {
            state.mappings.remove(&key);
            state.writes += 1;
            return Ok(None);
        }
        if current.is_being_deleted() {
            return Ok(Some(current));
        }
        current.metadata.deletion_timestamp = Some(deletion_time());
        Ok(Some(state.store(current)))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A [`Context`] wired to fakes, with handles to inspect them.
pub struct Harness {
    pub ctx: Context,
    pub director: Arc<FakeDirector>,
    pub control_plane: Arc<FakeControlPlane>,
    pub mappings: Arc<FakeMappingStore>,
    pub connector: Arc<FakeConnector>,
    pub secrets: Arc<FakeSecretApi>,
}

impl Harness {
    pub fn new() -> Self {
        let director = Arc::new(FakeDirector::default());
        let control_plane = Arc::new(FakeControlPlane::default());
        let mappings = Arc::new(FakeMappingStore::default());
        let secrets = Arc::new(FakeSecretApi::default());
        let connector = Arc::new(FakeConnector::new(Arc::clone(&secrets)));

        let ctx = Context::new(
            Arc::clone(&control_plane) as Arc<dyn ControlPlane>,
            Arc::clone(&mappings) as Arc<dyn MappingStore>,
            Arc::clone(&director) as Arc<dyn DirectorClient>,
            Arc::clone(&connector) as Arc<dyn TargetClusterConnector>,
            TEST_CONNECTOR_PATTERN,
            RetryPolicy::new(3, Duration::ZERO),
        );

        Self {
            ctx,
            director,
            control_plane,
            mappings,
            connector,
            secrets,
        }
    }

    pub fn key(name: &str) -> RuntimeKey {
        RuntimeKey::new(TEST_NAMESPACE, name)
    }

    /// Compass ID label currently on the mapping named `name`.
    pub fn compass_id(&self, name: &str) -> Option<String> {
        self.mappings
            .get(name)
            .and_then(|m| m.labels().get(LABEL_COMPASS_ID).cloned())
            .filter(|id| !id.is_empty())
    }
}
