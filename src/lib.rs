// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Compass Manager - Compass registration operator for Kyma runtimes
//!
//! Compass Manager watches `Kyma` resources on the control plane. For every runtime
//! with the Application Connector module enabled it registers the runtime in the
//! Compass Director, writes the runtime agent's bootstrap configuration onto the
//! target cluster, and deregisters the runtime once its `Kyma` goes away.
//!
//! Progress is recorded on a `CompassManagerMapping` resource per runtime, which is
//! the single source of truth across restarts.
//!
//! ## Modules
//!
//! - [`crd`] - `Kyma` (read) and `CompassManagerMapping` (owned) resource types
//! - [`reconcilers`] - The per-runtime state machine and its helpers
//! - [`director`] - Director client trait and its GraphQL implementation
//! - [`runtime_agent`] - Runtime agent configuration on target clusters
//! - [`mapping`] - Mapping store over `CompassManagerMapping`
//! - [`control_plane`] - Read-only access to `Kyma` resources and credentials
//! - [`controller`] - kube-runtime controller wiring
//! - [`config`] - Command-line and environment configuration
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use compass_manager::crd::CompassManagerMappingStatus;
//!
//! let status = CompassManagerMappingStatus::progressing(true, true);
//! assert_eq!(status.state, "Ready");
//!
//! let failed = CompassManagerMappingStatus::failed(true, false);
//! assert!(failed.is_failed());
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod control_plane;
pub mod controller;
pub mod crd;
pub mod director;
pub mod errors;
pub mod labels;
pub mod mapping;
pub mod metrics;
pub mod reconcilers;
pub mod runtime_agent;

#[cfg(test)]
pub(crate) mod test_support;
