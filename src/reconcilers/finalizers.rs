// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for namespaced resources.
//!
//! Both helpers guard the patch with the resource version that was read, so a
//! concurrent writer makes the patch fail with HTTP 409 instead of silently
//! dropping someone else's finalizer. Callers requeue on conflict.
//!
//! # Example
//!
//! ```rust,no_run
//! use compass_manager::crd::CompassManagerMapping;
//! use compass_manager::labels::FINALIZER_COMPASS_MAPPING;
//! use compass_manager::reconcilers::finalizers::ensure_finalizer;
//! use kube::Api;
//!
//! # async fn example(api: Api<CompassManagerMapping>, mapping: CompassManagerMapping) -> Result<(), kube::Error> {
//! let mapping = ensure_finalizer(&api, &mapping, FINALIZER_COMPASS_MAPPING).await?;
//! assert!(mapping.has_finalizer(FINALIZER_COMPASS_MAPPING));
//! # Ok(())
//! # }
//! ```

use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Resource, ResourceExt};
use serde_json::{json, Value};
use tracing::info;

/// Build a merge patch replacing the finalizer list, guarded by `resource_version`.
#[must_use]
pub fn finalizer_patch(resource_version: Option<&str>, finalizers: &[String]) -> Value {
    match resource_version {
        Some(version) => json!({
            "metadata": { "resourceVersion": version, "finalizers": finalizers }
        }),
        None => json!({ "metadata": { "finalizers": finalizers } }),
    }
}

/// Add a finalizer to a resource if not already present.
///
/// Returns the updated resource, or a clone of `resource` when nothing changed.
///
/// # Errors
///
/// Returns the API error if the patch fails, including HTTP 409 when the resource
/// changed since it was read.
pub async fn ensure_finalizer<T>(api: &Api<T>, resource: &T, finalizer: &str) -> Result<T, kube::Error>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if resource.finalizers().iter().any(|f| f == finalizer) {
        return Ok(resource.clone());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    let patch = finalizer_patch(resource.resource_version().as_deref(), &finalizers);
    let updated = api
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    info!(
        "Added finalizer {} to {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );
    Ok(updated)
}

/// Remove a finalizer from a resource if present.
///
/// Returns `Ok(())` if the finalizer was removed or already absent. Removing
/// the last finalizer of a resource marked for deletion lets Kubernetes delete it.
///
/// # Errors
///
/// Returns the API error if the patch fails, including HTTP 409 when the resource
/// changed since it was read.
pub async fn remove_finalizer<T>(
    api: &Api<T>,
    resource: &T,
    finalizer: &str,
) -> Result<(), kube::Error>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if !resource.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();

    let patch = finalizer_patch(resource.resource_version().as_deref(), &finalizers);
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    info!(
        "Removed finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );
    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
