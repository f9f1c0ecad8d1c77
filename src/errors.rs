// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for Compass Manager.
//!
//! This module provides specialized error types for:
//! - Director GraphQL calls (registration, deregistration, one-time tokens)
//! - Runtime agent configuration on the target cluster
//! - Mapping store writes against the control plane
//! - The reconciler, which aggregates all of the above
//!
//! Every error knows whether it is transient. Transient errors are retried by the
//! retry helper and then by the controller requeue; permanent ones latch
//! `state=Failed` on the mapping.

use crate::reconcilers::retry::{is_retryable_error, RetryError, Transient};
use thiserror::Error;

/// Errors returned by the Director.
#[derive(Error, Debug, Clone)]
pub enum DirectorError {
    /// Network failure, timeout, rate limiting or a server-side error.
    #[error("Director {operation} failed (transient): {message}")]
    Transient {
        /// The Director operation (e.g. `registerRuntime`)
        operation: String,
        /// Error detail
        message: String,
    },

    /// The Director rejected the request; retrying with the same input will not help.
    #[error("Director {operation} failed: {message}")]
    Permanent {
        /// The Director operation (e.g. `registerRuntime`)
        operation: String,
        /// Error detail
        message: String,
    },

    /// The referenced runtime does not exist in the Director.
    #[error("Director {operation}: runtime not found: {message}")]
    NotFound {
        /// The Director operation (e.g. `unregisterRuntime`)
        operation: String,
        /// Error detail
        message: String,
    },
}

impl DirectorError {
    pub fn transient(operation: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(operation: &str, message: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

impl Transient for DirectorError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors from configuring the Compass runtime agent on a target cluster.
#[derive(Error, Debug)]
pub enum ConfigureError {
    /// The kubeconfig from the credentials secret could not be turned into a client.
    #[error("Invalid kubeconfig for target runtime: {0}")]
    InvalidKubeconfig(String),

    /// Fetching the one-time token from the Director failed.
    #[error("Failed to fetch one-time token: {0}")]
    Director(#[from] RetryError<DirectorError>),

    /// The connector URL does not contain the configured pattern.
    #[error("Connector URL '{url}' does not match the expected pattern '{pattern}'")]
    ConnectorUrlMismatch {
        /// URL returned by the Director
        url: String,
        /// Configured pattern
        pattern: String,
    },

    /// The one-time token is not valid base64 or decodes to too many bytes.
    #[error("One-time token is too long or cannot be decoded: {0}")]
    InvalidToken(String),

    /// Writing the agent configuration secret failed.
    #[error("Failed to write agent configuration on target runtime: {0}")]
    TargetCluster(#[from] RetryError<kube::Error>),
}

impl ConfigureError {
    /// Whether the error should latch `state=Failed` instead of being retried.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidKubeconfig(_)
            | Self::ConnectorUrlMismatch { .. }
            | Self::InvalidToken(_) => true,
            Self::Director(err) => !err.source.is_transient(),
            Self::TargetCluster(err) => !is_retryable_error(&err.source),
        }
    }
}

/// Errors from mapping store writes.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The mapping changed since it was read (HTTP 409 on a guarded write).
    #[error("CompassManagerMapping {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Mapping namespace
        namespace: String,
        /// Mapping name
        name: String,
    },

    /// The mapping already exists (HTTP 409 on create).
    #[error("CompassManagerMapping {namespace}/{name} already exists")]
    AlreadyExists {
        /// Mapping namespace
        namespace: String,
        /// Mapping name
        name: String,
    },

    /// Any other control-plane API failure.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    /// Classify a kube error returned by a write on the given mapping.
    #[must_use]
    pub fn from_write(err: kube::Error, namespace: &str, name: &str) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 409 => {
                if response.reason == "AlreadyExists" {
                    Self::AlreadyExists {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }
                } else {
                    Self::Conflict {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }
                }
            }
            _ => Self::Kube(err),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }
}

/// Errors surfaced by a reconciliation; the controller requeues on all of them.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Reading Kyma resources or credentials secrets failed.
    #[error("Control-plane read failed: {0}")]
    ControlPlane(#[from] kube::Error),

    /// A mapping write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Registering the runtime failed after all attempts.
    #[error("Failed to register runtime in Compass: {0}")]
    Registration(RetryError<DirectorError>),

    /// Configuring the runtime agent failed with a transient error.
    #[error(transparent)]
    Configuration(#[from] ConfigureError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
