// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime reconciliation: registration, configuration, token refresh and
//! deregistration of one Kyma runtime.
//!
//! # Progress
//!
//! | Situation | Action | Outcome |
//! |-----------|--------|---------|
//! | Kyma absent or deleting, no mapping | forget the runtime | done |
//! | credentials secret missing, no mapping | wait | requeue |
//! | Application Connector not enabled, no mapping | wait | done |
//! | mapping without `compass-id` | `registerRuntime`, persist ID, `registered=true` | continue |
//! | `registered`, not `configured` | configure runtime agent, `Ready` | ready |
//! | `Ready`, module re-enabled | configure again with the same ID | ready |
//! | Kyma deleting or absent, mapping present | `unregisterRuntime`, drop finalizer, delete mapping | done |
//!
//! A pass moves the runtime forward as far as it can. Transient failures surface
//! as errors and the controller requeues; permanent failures latch `state=Failed`
//! on the mapping and wait for the next Kyma or credentials change.
//!
//! The `compass-id` label is written once. It is persisted before `registered`
//! is set, and a mapping that already carries it is never registered again.

use kube::runtime::controller::Action;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::constants::{
    CONFLICT_REQUEUE_DURATION_SECS, CREDENTIALS_REQUEUE_DURATION_SECS,
    READY_REQUEUE_DURATION_SECS,
};
use crate::context::Context;
use crate::crd::{CompassManagerMapping, CompassManagerMappingStatus, Kyma};
use crate::director::RuntimeLabels;
use crate::errors::{ReconcileError, StoreError};
use crate::labels::LABEL_COMPASS_ID;
use crate::mapping::new_mapping;
use crate::metrics;
use crate::reconcilers::retry::{retry_on_error, Transient};
use crate::reconcilers::status_changed;
use crate::reconcilers::tracking::{ModuleObservation, RuntimeKey};

/// Which watch triggered a reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A Kyma or its credentials secret changed
    Kyma,
    /// A mapping changed; only removal is handled from here
    Mapping,
}

/// How a pass ended, when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the next change
    Done,
    /// Registered and configured
    Ready,
    /// Waiting for the credentials secret
    MissingCredentials,
    /// A write lost an optimistic-concurrency race
    Conflict,
    /// A permanent error was latched on the mapping
    Failed,
}

impl ReconcileOutcome {
    /// Controller action for this outcome.
    #[must_use]
    pub fn action(self) -> Action {
        match self {
            Self::Done | Self::Failed => Action::await_change(),
            Self::Ready => Action::requeue(Duration::from_secs(READY_REQUEUE_DURATION_SECS)),
            Self::MissingCredentials => {
                Action::requeue(Duration::from_secs(CREDENTIALS_REQUEUE_DURATION_SECS))
            }
            Self::Conflict => Action::requeue(Duration::from_secs(CONFLICT_REQUEUE_DURATION_SECS)),
        }
    }

    /// Requeue reason for metrics, `None` when the pass waits for a change.
    #[must_use]
    pub fn requeue_reason(self) -> Option<&'static str> {
        match self {
            Self::Done | Self::Failed => None,
            Self::Ready => Some("resync"),
            Self::MissingCredentials => Some("missing_credentials"),
            Self::Conflict => Some("conflict"),
        }
    }
}

/// Reconcile the runtime identified by `key`.
///
/// At most one pass per key runs at a time, whichever controller triggered it.
///
/// # Errors
///
/// Returns an error for control-plane read failures, store failures other than
/// conflicts, and transient Director or target-cluster failures that outlasted the
/// retry budget. The caller requeues on every error.
pub async fn reconcile_runtime(
    ctx: &Context,
    key: &RuntimeKey,
    trigger: Trigger,
) -> Result<ReconcileOutcome, ReconcileError> {
    let _guard = ctx.locks.lock(key).await;

    let kyma = ctx.control_plane.get_kyma(&key.namespace, &key.name).await?;
    let mapping = ctx.mappings.get_by_kyma(&key.namespace, &key.name).await?;

    let mapping_deleting = mapping
        .as_ref()
        .is_some_and(CompassManagerMapping::is_being_deleted);

    let result = match kyma {
        Some(kyma) if !kyma.is_being_deleted() && !mapping_deleting => {
            if trigger == Trigger::Mapping {
                debug!(runtime = %key, "Kyma is live; mapping event needs no action");
                return Ok(ReconcileOutcome::Done);
            }
            reconcile_live(ctx, key, &kyma, mapping).await
        }
        kyma => reconcile_removal(ctx, key, kyma.as_ref(), mapping).await,
    };

    match result {
        Err(ReconcileError::Store(err)) if err.is_conflict() => {
            debug!(runtime = %key, error = %err, "Mapping changed concurrently, requeueing");
            Ok(ReconcileOutcome::Conflict)
        }
        other => other,
    }
}

/// Drive a live runtime towards `Ready`.
async fn reconcile_live(
    ctx: &Context,
    key: &RuntimeKey,
    kyma: &Kyma,
    mapping: Option<CompassManagerMapping>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let observation = ctx.modules.observe(key, kyma);

    let Some(kubeconfig) = ctx
        .control_plane
        .find_kubeconfig(&key.namespace, &kyma.kyma_name())
        .await?
    else {
        debug!(runtime = %key, "Credentials secret not found, waiting");
        return Ok(ReconcileOutcome::MissingCredentials);
    };

    let mut mapping = match mapping {
        Some(mapping) => ctx.mappings.ensure_finalizer(&mapping).await?,
        None if !observation.enabled => {
            debug!(runtime = %key, "Application Connector not enabled, no mapping created");
            ctx.modules.commit(key, observation.enabled);
            return Ok(ReconcileOutcome::Done);
        }
        None => {
            info!("Creating CompassManagerMapping {}", key);
            ctx.mappings.create(&new_mapping(kyma)).await?
        }
    };

    let global_account = kyma.global_account_id();

    let compass_id = if let Some(id) = mapping.compass_id() {
        id.to_string()
    } else {
        match register(ctx, key, kyma, &mut mapping).await? {
            Some(id) => id,
            None => {
                ctx.modules.commit(key, observation.enabled);
                return Ok(ReconcileOutcome::Failed);
            }
        }
    };

    let outcome = configure(
        ctx,
        key,
        &mut mapping,
        &kubeconfig,
        &compass_id,
        &global_account,
        observation,
    )
    .await?;

    ctx.modules.commit(key, observation.enabled);
    Ok(outcome)
}

/// Register the runtime and persist its Compass ID on the mapping.
///
/// Returns `None` when the Director rejected the runtime and `Failed` was latched.
async fn register(
    ctx: &Context,
    key: &RuntimeKey,
    kyma: &Kyma,
    mapping: &mut CompassManagerMapping,
) -> Result<Option<String>, ReconcileError> {
    let compass_id = if let Some(pending) = ctx.pending.get(key) {
        debug!(runtime = %key, compass_id = %pending, "Reusing unpersisted Compass ID");
        pending
    } else {
        let labels = RuntimeLabels::from_kyma(kyma);
        match retry_on_error(&ctx.retry, "register runtime", || {
            ctx.director.register_in_compass(&labels)
        })
        .await
        {
            Ok(id) => {
                ctx.pending.insert(key, &id);
                id
            }
            Err(err) if !err.source.is_transient() => {
                error!(runtime = %key, error = %err, "Director rejected runtime registration");
                metrics::record_runtime_event("failed");
                write_status(ctx, mapping, CompassManagerMappingStatus::failed(false, false))
                    .await?;
                return Ok(None);
            }
            Err(err) => return Err(ReconcileError::Registration(err)),
        }
    };

    let labels = BTreeMap::from([(LABEL_COMPASS_ID.to_string(), compass_id.clone())]);
    *mapping = ctx.mappings.set_labels(mapping, &labels).await?;
    ctx.pending.remove(key);

    write_status(ctx, mapping, CompassManagerMappingStatus::progressing(true, false)).await?;

    info!(
        runtime = %key,
        compass_id = %compass_id,
        "Runtime registered in Compass"
    );
    metrics::record_runtime_event("registered");
    Ok(Some(compass_id))
}

/// Configure the runtime agent when it is not configured yet or the module came back.
async fn configure(
    ctx: &Context,
    key: &RuntimeKey,
    mapping: &mut CompassManagerMapping,
    kubeconfig: &[u8],
    compass_id: &str,
    global_account: &str,
    observation: ModuleObservation,
) -> Result<ReconcileOutcome, ReconcileError> {
    let refresh = mapping.is_configured() && observation.re_enabled;

    if mapping.is_configured() && !refresh {
        write_status(ctx, mapping, CompassManagerMappingStatus::progressing(true, true)).await?;
        debug!(runtime = %key, compass_id = %compass_id, "Runtime already configured");
        return Ok(ReconcileOutcome::Ready);
    }

    if refresh {
        info!(
            runtime = %key,
            compass_id = %compass_id,
            "Application Connector re-enabled, refreshing one-time token"
        );
    }

    match ctx
        .configurator
        .configure(kubeconfig, compass_id, global_account)
        .await
    {
        Ok(()) => {
            write_status(ctx, mapping, CompassManagerMappingStatus::progressing(true, true))
                .await?;
            info!(
                runtime = %key,
                compass_id = %compass_id,
                "Runtime agent configured, mapping is Ready"
            );
            metrics::record_runtime_event(if refresh { "token_refreshed" } else { "configured" });
            Ok(ReconcileOutcome::Ready)
        }
        Err(err) if err.is_permanent() => {
            error!(
                runtime = %key,
                compass_id = %compass_id,
                error = %err,
                "Runtime agent configuration failed permanently"
            );
            metrics::record_runtime_event("failed");
            write_status(ctx, mapping, CompassManagerMappingStatus::failed(true, false)).await?;
            Ok(ReconcileOutcome::Failed)
        }
        Err(err) => {
            warn!(
                runtime = %key,
                compass_id = %compass_id,
                error = %err,
                "Runtime agent configuration failed, will retry"
            );
            Err(err.into())
        }
    }
}

/// Deregister the runtime and let its mapping go.
async fn reconcile_removal(
    ctx: &Context,
    key: &RuntimeKey,
    kyma: Option<&Kyma>,
    mapping: Option<CompassManagerMapping>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let Some(mut mapping) = mapping else {
        debug!(runtime = %key, "Kyma gone and no mapping left");
        ctx.modules.forget(key);
        ctx.pending.remove(key);
        return Ok(ReconcileOutcome::Done);
    };

    info!("Removing runtime {} from Compass", key);

    let compass_id = mapping
        .compass_id()
        .map(str::to_string)
        .or_else(|| ctx.pending.get(key));

    if let Some(compass_id) = compass_id {
        let mut global_account = mapping.global_account_id();
        if global_account.is_empty() {
            global_account = kyma.map(Kyma::global_account_id).unwrap_or_default();
        }

        match retry_on_error(&ctx.retry, "deregister runtime", || {
            ctx.director
                .deregister_from_compass(&compass_id, &global_account)
        })
        .await
        {
            Ok(()) => {
                info!(
                    runtime = %key,
                    compass_id = %compass_id,
                    "Runtime deregistered from Compass"
                );
                metrics::record_runtime_event("deregistered");
            }
            Err(err) => {
                error!(
                    runtime = %key,
                    compass_id = %compass_id,
                    error = %err,
                    "Giving up on runtime deregistration"
                );
                metrics::record_runtime_event("failed");
                let status = mapping.current_status();
                let failed =
                    CompassManagerMappingStatus::failed(status.registered, status.configured);
                if let Err(e) = write_status(ctx, &mut mapping, failed).await {
                    warn!(runtime = %key, error = %e, "Could not record failed deregistration");
                }
            }
        }
    }

    // Delete first so the finalizer is released on the version the delete returned
    let held = if mapping.is_being_deleted() {
        Some(mapping)
    } else {
        ctx.mappings.delete(&mapping).await?
    };
    if let Some(held) = held {
        ctx.mappings.remove_finalizer(&held).await?;
    }

    ctx.modules.forget(key);
    ctx.pending.remove(key);
    info!("CompassManagerMapping {} removed", key);
    Ok(ReconcileOutcome::Done)
}

/// Write `status` only when it differs from the mapping's current status.
async fn write_status(
    ctx: &Context,
    mapping: &mut CompassManagerMapping,
    status: CompassManagerMappingStatus,
) -> Result<(), StoreError> {
    if status_changed(&mapping.status, &Some(status.clone())) {
        *mapping = ctx.mappings.set_status(mapping, &status).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "compass_tests.rs"]
mod compass_tests;
