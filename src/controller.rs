// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller wiring: watch adapters, reconcile wrappers and error policy.
//!
//! Two controllers feed the same reconciler:
//!
//! - The Kyma controller is keyed on `Kyma` and also watches credentials secrets,
//!   mapping each secret to the Kyma named by its `operator.kyma-project.io/kyma-name`
//!   label in the same namespace.
//! - The mapping controller is keyed on `CompassManagerMapping` and also watches
//!   Kyma resources, mapping each to the mapping of the same name. kube-runtime stops
//!   reconciling a key once its object is gone, so this controller is what sees a
//!   Kyma deleted outright and releases its mapping.
//!
//! Both controllers share one [`Context`], whose per-key lock keeps at most one
//! pass in flight per runtime.

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::constants::{ERROR_REQUEUE_DURATION_SECS, KIND_COMPASS_MANAGER_MAPPING, KIND_KYMA};
use crate::context::Context;
use crate::crd::{CompassManagerMapping, Kyma};
use crate::errors::ReconcileError;
use crate::labels::LABEL_KYMA_NAME;
use crate::metrics;
use crate::reconcilers::tracking::RuntimeKey;
use crate::reconcilers::{reconcile_runtime, ReconcileOutcome, Trigger};

/// Map a credentials secret to the Kyma it belongs to.
///
/// Secrets without a namespace or with an empty `kyma-name` label map to nothing.
#[must_use]
pub fn secret_to_kyma(secret: &Secret) -> Option<ObjectRef<Kyma>> {
    let namespace = secret.namespace()?;
    let kyma_name = secret
        .labels()
        .get(LABEL_KYMA_NAME)
        .filter(|name| !name.is_empty())?;
    Some(ObjectRef::new(kyma_name).within(&namespace))
}

/// Map a Kyma, live or just deleted, to the mapping paired with it.
#[must_use]
pub fn kyma_to_mapping(kyma: &Kyma) -> Option<ObjectRef<CompassManagerMapping>> {
    let namespace = kyma.namespace()?;
    Some(ObjectRef::new(&kyma.name_any()).within(&namespace))
}

/// Reconciliation key of a namespaced object.
fn runtime_key<K: ResourceExt>(obj: &K) -> RuntimeKey {
    RuntimeKey::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Run one pass and record its metrics under `resource_type`.
///
/// # Errors
///
/// Returns the reconciler's error unchanged; the error policy decides the requeue.
pub async fn run_pass(
    ctx: &Context,
    key: &RuntimeKey,
    trigger: Trigger,
    resource_type: &str,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_runtime(ctx, key, trigger).await;
    let duration = start.elapsed();

    match &result {
        Ok(outcome) => {
            metrics::record_reconciliation_success(resource_type, duration);
            if let Some(reason) = outcome.requeue_reason() {
                metrics::record_reconciliation_requeue(resource_type, reason);
            }
            debug!(runtime = %key, ?outcome, "Reconciliation finished");
        }
        Err(_) => metrics::record_reconciliation_error(resource_type, duration),
    }

    result.map(ReconcileOutcome::action)
}

async fn reconcile_kyma(kyma: Arc<Kyma>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    run_pass(&ctx, &runtime_key(kyma.as_ref()), Trigger::Kyma, KIND_KYMA).await
}

async fn reconcile_mapping(
    mapping: Arc<CompassManagerMapping>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    run_pass(
        &ctx,
        &runtime_key(mapping.as_ref()),
        Trigger::Mapping,
        KIND_COMPASS_MANAGER_MAPPING,
    )
    .await
}

/// Requeue after a fixed delay whatever the error.
///
/// Permanent failures never reach this point; they are latched on the mapping.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy<K>(resource: Arc<K>, err: &ReconcileError, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(
        runtime = %runtime_key(resource.as_ref()),
        error = %err,
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    metrics::record_reconciliation_requeue(K::kind(&()).as_ref(), "error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Run the controller keyed on `Kyma`, watching credentials secrets as well.
///
/// Returns once a shutdown signal was received and in-flight passes finished.
///
/// # Errors
///
/// Currently never fails; the result mirrors the other controller entry points.
pub async fn run_kyma_controller(
    client: Client,
    namespace: &str,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Result<()> {
    info!("Starting Kyma controller in namespace {}", namespace);

    let kymas = Api::<Kyma>::namespaced(client.clone(), namespace);
    let secrets = Api::<Secret>::namespaced(client, namespace);

    Controller::new(kymas, WatcherConfig::default())
        .watches(
            secrets,
            WatcherConfig::default().labels(LABEL_KYMA_NAME),
            |secret| secret_to_kyma(&secret),
        )
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile_kyma, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!(error = %e, "Kyma reconciliation event error");
            }
        })
        .await;

    info!("Kyma controller stopped");
    Ok(())
}

/// Run the controller keyed on `CompassManagerMapping`, watching Kyma resources as well.
///
/// Kyma delete events reach the mapper too, so a Kyma removed without a
/// lingering finalizer still gets its runtime deregistered.
///
/// # Errors
///
/// Currently never fails; the result mirrors the other controller entry points.
pub async fn run_mapping_controller(
    client: Client,
    namespace: &str,
    ctx: Arc<Context>,
    concurrency: u16,
) -> Result<()> {
    info!("Starting CompassManagerMapping controller in namespace {}", namespace);

    let mappings = Api::<CompassManagerMapping>::namespaced(client.clone(), namespace);
    let kymas = Api::<Kyma>::namespaced(client, namespace);

    Controller::new(mappings, WatcherConfig::default())
        .watches(kymas, WatcherConfig::default(), |kyma| kyma_to_mapping(&kyma))
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile_mapping, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!(error = %e, "CompassManagerMapping reconciliation event error");
            }
        })
        .await;

    info!("CompassManagerMapping controller stopped");
    Ok(())
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
