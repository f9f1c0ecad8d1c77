// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for both controllers.
//!
//! Every reconciliation receives an `Arc<Context>` holding:
//! - the control-plane reader and the mapping store
//! - the Director client and the runtime agent configurator built on top of it
//! - the retry policy for Director calls
//! - the per-key locks, module snapshots and pending registrations

use std::sync::Arc;

use crate::control_plane::ControlPlane;
use crate::director::DirectorClient;
use crate::mapping::MappingStore;
use crate::reconcilers::retry::RetryPolicy;
use crate::reconcilers::tracking::{KeyLocks, ModuleTracker, PendingRegistrations};
use crate::runtime_agent::{RuntimeAgentConfigurator, TargetClusterConnector};

/// Shared context passed to all reconciliations.
pub struct Context {
    /// Reads Kyma resources and credentials secrets
    pub control_plane: Arc<dyn ControlPlane>,

    /// Reads and writes `CompassManagerMapping` resources
    pub mappings: Arc<dyn MappingStore>,

    /// Registers and deregisters runtimes
    pub director: Arc<dyn DirectorClient>,

    /// Writes the agent configuration to target runtimes
    pub configurator: RuntimeAgentConfigurator,

    /// Inner retry for Director calls
    pub retry: RetryPolicy,

    pub locks: KeyLocks,
    pub modules: ModuleTracker,
    pub pending: PendingRegistrations,
}

impl Context {
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        mappings: Arc<dyn MappingStore>,
        director: Arc<dyn DirectorClient>,
        connector: Arc<dyn TargetClusterConnector>,
        connector_url_pattern: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let configurator = RuntimeAgentConfigurator::new(
            Arc::clone(&director),
            connector,
            connector_url_pattern,
            retry,
        );

        Self {
            control_plane,
            mappings,
            director,
            configurator,
            retry,
            locks: KeyLocks::default(),
            modules: ModuleTracker::default(),
            pending: PendingRegistrations::default(),
        }
    }
}
