// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for Kyma runtimes.
//!
//! Both controllers funnel into [`reconcile_runtime`], keyed by the
//! `(namespace, name)` shared by a `Kyma` and its `CompassManagerMapping`.
//!
//! # Modules
//!
//! - [`compass`] - The registration, configuration and deregistration state machine
//! - [`finalizers`] - Finalizer patches guarded by the resource version
//! - [`retry`] - Fixed-delay retry for Director calls and target-cluster writes
//! - [`tracking`] - Per-key locks, module snapshots and pending registrations
//!
//! # Example: Reconciling a runtime
//!
//! ```rust,no_run
//! use compass_manager::context::Context;
//! use compass_manager::reconcilers::{reconcile_runtime, Trigger};
//! use compass_manager::reconcilers::tracking::RuntimeKey;
//!
//! async fn reconcile_one(ctx: &Context) -> anyhow::Result<()> {
//!     let key = RuntimeKey::new("kcp-system", "all-good");
//!     let outcome = reconcile_runtime(ctx, &key, Trigger::Kyma).await?;
//!     println!("{key}: {outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod compass;
pub mod finalizers;
pub mod retry;
pub mod tracking;

pub use compass::{reconcile_runtime, ReconcileOutcome, Trigger};

/// Check if a status value has actually changed compared to the current status.
///
/// Status writes on a mapping emit watch events, so unchanged values are never
/// written back.
///
/// # Example
///
/// ```rust
/// use compass_manager::reconcilers::status_changed;
///
/// assert!(status_changed(&None, &Some(true)));
/// assert!(!status_changed(&Some(true), &Some(true)));
/// ```
#[must_use]
pub fn status_changed<T: PartialEq>(current_value: &Option<T>, new_value: &Option<T>) -> bool {
    current_value != new_value
}
