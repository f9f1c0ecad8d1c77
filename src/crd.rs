// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) used by Compass Manager.
//!
//! # Resource Types
//!
//! - [`Kyma`] - A managed runtime, owned by the lifecycle manager. Compass Manager only
//!   reads it; the type models just the fields the reconciler needs and ignores the rest.
//! - [`CompassManagerMapping`] - Owned by Compass Manager. One per `Kyma`, same
//!   namespace and name, carrying the Compass runtime ID and reconciliation progress.
//!
//! # Example: Reading progress from a mapping
//!
//! ```rust
//! use compass_manager::crd::{CompassManagerMapping, CompassManagerMappingSpec};
//!
//! let mapping = CompassManagerMapping::new("all-good", CompassManagerMappingSpec::default());
//! assert!(mapping.compass_id().is_none());
//! assert!(!mapping.is_ready());
//! ```

use crate::constants::{STATE_FAILED, STATE_READY};
use crate::labels::{
    APPLICATION_CONNECTOR_MODULE, LABEL_COMPASS_ID, LABEL_GLOBAL_ACCOUNT_ID, LABEL_KYMA_NAME,
    LABEL_MAPPING_GLOBAL_ACCOUNT_ID, LABEL_SHOOT_NAME, MODULE_STATE_DELETING,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// Kyma
// ============================================================================

/// Desired state of a Kyma runtime, as far as Compass Manager cares.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operator.kyma-project.io", // constants::API_GROUP
    version = "v1beta2",                 // constants::KYMA_API_VERSION
    kind = "Kyma",
    plural = "kymas",
    namespaced,
    status = "KymaStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KymaSpec {
    /// Release channel of the runtime (e.g. `regular`, `fast`)
    #[serde(default)]
    pub channel: String,

    /// Modules requested by the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<Module>,
}

/// A module requested in `Kyma.spec.modules`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Observed state of a Kyma runtime.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KymaStatus {
    /// Overall state reported by the lifecycle manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Per-module state
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
}

/// State of a single module as reported in `Kyma.status.modules`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub name: String,
    #[serde(default)]
    pub state: String,
}

impl Kyma {
    /// Global account ID label, empty when missing.
    #[must_use]
    pub fn global_account_id(&self) -> String {
        self.labels()
            .get(LABEL_GLOBAL_ACCOUNT_ID)
            .cloned()
            .unwrap_or_default()
    }

    /// Shoot name label, empty when missing.
    #[must_use]
    pub fn shoot_name(&self) -> String {
        self.labels().get(LABEL_SHOOT_NAME).cloned().unwrap_or_default()
    }

    /// Kyma name label, falling back to the resource name.
    ///
    /// Credentials secrets are paired with their Kyma through this value.
    #[must_use]
    pub fn kyma_name(&self) -> String {
        self.labels()
            .get(LABEL_KYMA_NAME)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| self.name_any())
    }

    /// Whether the resource has been marked for deletion.
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status entry of the Application Connector module, if listed.
    #[must_use]
    pub fn application_connector(&self) -> Option<&ModuleStatus> {
        self.status
            .as_ref()
            .and_then(|status| {
                status
                    .modules
                    .iter()
                    .find(|module| module.name == APPLICATION_CONNECTOR_MODULE)
            })
    }

    /// Whether the Application Connector module is listed and not being removed.
    #[must_use]
    pub fn application_connector_enabled(&self) -> bool {
        self.application_connector()
            .is_some_and(|module| module.state != MODULE_STATE_DELETING)
    }
}

// ============================================================================
// CompassManagerMapping
// ============================================================================

/// The mapping carries no desired state; everything lives in labels and status.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operator.kyma-project.io", // constants::API_GROUP
    version = "v1beta1",                 // constants::MAPPING_API_VERSION
    kind = "CompassManagerMapping",
    plural = "compassmanagermappings",
    namespaced,
    status = "CompassManagerMappingStatus",
    printcolumn = r#"{"name":"Registered","type":"boolean","jsonPath":".status.registered"}"#,
    printcolumn = r#"{"name":"Configured","type":"boolean","jsonPath":".status.configured"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CompassManagerMappingSpec {}

/// Progress of a single runtime.
///
/// Invariants: `configured ⇒ registered` and `registered ⇒ compass-id label set`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompassManagerMappingStatus {
    /// `registerRuntime` returned an ID and it was persisted in the compass-id label
    #[serde(default)]
    pub registered: bool,

    /// The agent configuration secret was written to the target runtime
    #[serde(default)]
    pub configured: bool,

    /// `Ready`, `Failed`, or empty while in progress
    #[serde(default)]
    pub state: String,
}

impl CompassManagerMappingStatus {
    /// Progress after a successful step; `Ready` iff both halves are done.
    #[must_use]
    pub fn progressing(registered: bool, configured: bool) -> Self {
        let configured = registered && configured;
        Self {
            registered,
            configured,
            state: if configured {
                STATE_READY.to_string()
            } else {
                String::new()
            },
        }
    }

    /// Progress with a latched non-retryable error.
    #[must_use]
    pub fn failed(registered: bool, configured: bool) -> Self {
        Self {
            registered,
            configured: registered && configured,
            state: STATE_FAILED.to_string(),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == STATE_FAILED
    }
}

impl CompassManagerMapping {
    /// The Director-assigned runtime ID, if registration already succeeded.
    #[must_use]
    pub fn compass_id(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_COMPASS_ID))
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Global account copied from the Kyma when the mapping was created.
    #[must_use]
    pub fn global_account_id(&self) -> String {
        self.labels()
            .get(LABEL_MAPPING_GLOBAL_ACCOUNT_ID)
            .cloned()
            .unwrap_or_default()
    }

    /// Current status, or the empty default.
    #[must_use]
    pub fn current_status(&self) -> CompassManagerMappingStatus {
        self.status.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.compass_id().is_some() && self.current_status().registered
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.is_registered() && self.current_status().configured
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.is_configured() && self.current_status().state == STATE_READY
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
