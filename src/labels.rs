// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, finalizer and module-name constants used across the reconciler.
//!
//! The Kyma labels are written by the lifecycle manager; the Compass labels are
//! written by this operator and carry reconciliation progress, so they are part
//! of the state machine and not just metadata.

// ============================================================================
// Kyma Labels (read)
// ============================================================================

/// Global account the runtime belongs to
pub const LABEL_GLOBAL_ACCOUNT_ID: &str = "kyma-project.io/global-account-id";

/// Gardener shoot name of the runtime
pub const LABEL_SHOOT_NAME: &str = "kyma-project.io/shoot-name";

/// Kyma resource name; pairs credentials secrets and mappings with their Kyma
pub const LABEL_KYMA_NAME: &str = "operator.kyma-project.io/kyma-name";

// ============================================================================
// Mapping Labels (written)
// ============================================================================

/// Director-assigned runtime identifier; write-once
pub const LABEL_COMPASS_ID: &str = "operator.kyma-project.io/compass-id";

/// Global account copied from the Kyma resource
pub const LABEL_MAPPING_GLOBAL_ACCOUNT_ID: &str = "operator.kyma-project.io/global-account-id";

/// Shoot name copied from the Kyma resource
pub const LABEL_MAPPING_SHOOT_NAME: &str = "operator.kyma-project.io/shoot-name";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for `app.kubernetes.io/managed-by` on resources this operator creates
pub const MANAGED_BY_COMPASS_MANAGER: &str = "compass-manager";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer blocking mapping removal until deregistration was attempted
pub const FINALIZER_COMPASS_MAPPING: &str = "operator.kyma-project.io/compass-manager";

// ============================================================================
// Modules
// ============================================================================

/// Name of the Application Connector module in `Kyma.status.modules`
pub const APPLICATION_CONNECTOR_MODULE: &str = "application-connector";

/// Module state reported while the module is being installed or re-enabled
pub const MODULE_STATE_PROCESSING: &str = "Processing";

/// Module state reported while the module is being removed
pub const MODULE_STATE_DELETING: &str = "Deleting";
