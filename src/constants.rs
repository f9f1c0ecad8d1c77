// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Compass Manager operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

// The `#[kube(...)]` attributes in crd.rs cannot reference constants, so they
// repeat these values literally. crd_tests.rs checks that the two agree.

/// API group shared by the `Kyma` and `CompassManagerMapping` CRDs
pub const API_GROUP: &str = "operator.kyma-project.io";

/// API version of the `Kyma` resource we watch
pub const KYMA_API_VERSION: &str = "v1beta2";

/// API version of the `CompassManagerMapping` resource we own
pub const MAPPING_API_VERSION: &str = "v1beta1";

/// Kind name for the `Kyma` resource
pub const KIND_KYMA: &str = "Kyma";

/// Kind name for the `CompassManagerMapping` resource
pub const KIND_COMPASS_MANAGER_MAPPING: &str = "CompassManagerMapping";

// ============================================================================
// Namespaces
// ============================================================================

/// Control-plane namespace holding `Kyma` resources, credentials and mappings
pub const KCP_NAMESPACE: &str = "kcp-system";

/// Namespace on the target runtime where the agent configuration lives
pub const RUNTIME_AGENT_NAMESPACE: &str = "kyma-system";

// ============================================================================
// Runtime Agent Configuration
// ============================================================================

/// Name of the secret on the target runtime carrying the bootstrap parameters
pub const AGENT_CONFIGURATION_SECRET_NAME: &str = "compass-agent-configuration";

/// Key in the credentials secret holding the target kubeconfig
pub const KUBECONFIG_KEY: &str = "config";

/// Upper bound for the base64-decoded one-time token, in bytes
pub const MAX_TOKEN_LENGTH: usize = 100;

/// Agent configuration key: connector URL
pub const CONNECTOR_URL_KEY: &str = "CONNECTOR_URL";

/// Agent configuration key: Compass runtime ID
pub const RUNTIME_ID_KEY: &str = "RUNTIME_ID";

/// Agent configuration key: tenant (global account)
pub const TENANT_KEY: &str = "TENANT";

/// Agent configuration key: one-time token
pub const TOKEN_KEY: &str = "TOKEN";

// ============================================================================
// Mapping States
// ============================================================================

/// Mapping state once both registration and configuration succeeded
pub const STATE_READY: &str = "Ready";

/// Mapping state once a non-retryable error has been latched
pub const STATE_FAILED: &str = "Failed";

// ============================================================================
// Retry Defaults
// ============================================================================

/// Default number of attempts for a single Director call or target write
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

/// Default fixed delay between attempts (seconds)
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default deadline for a single external call (seconds)
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Controller Timing
// ============================================================================

/// Requeue interval after a reconciliation error (seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue interval while waiting for the credentials secret (seconds)
pub const CREDENTIALS_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue interval after an optimistic-concurrency conflict (seconds)
pub const CONFLICT_REQUEUE_DURATION_SECS: u64 = 1;

/// Periodic resync of a `Ready` runtime (5 minutes)
pub const READY_REQUEUE_DURATION_SECS: u64 = 300;

/// Default number of concurrent reconciliations per controller
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;

/// Default grace period for in-flight reconciliations at shutdown (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

// ============================================================================
// Target Cluster Client
// ============================================================================

/// Connect timeout for clients built from runtime kubeconfigs (seconds)
pub const TARGET_CONNECT_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Director
// ============================================================================

/// HTTP header carrying the tenant (global account) on Director requests
pub const DIRECTOR_TENANT_HEADER: &str = "Tenant";

/// Refresh the OAuth access token this many seconds before it expires
pub const OAUTH_TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

// ============================================================================
// Metrics Server
// ============================================================================

/// Default bind address for the metrics and health endpoints
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
