// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::{ConfigureError, DirectorError, StoreError};
    use crate::reconcilers::retry::{RetryError, Transient};

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(Box::new(kube::error::ErrorResponse {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
            metadata: None,
            details: None,
        }))
    }

    fn retried<E>(source: E) -> RetryError<E> {
        RetryError {
            operation: "test".to_string(),
            attempts: 4,
            source,
        }
    }

    #[test]
    fn test_only_transient_director_errors_are_retried() {
        assert!(DirectorError::transient("registerRuntime", "timeout").is_transient());
        assert!(!DirectorError::permanent("registerRuntime", "bad input").is_transient());
        assert!(!DirectorError::not_found("unregisterRuntime", "gone").is_transient());
    }

    #[test]
    fn test_director_error_display() {
        let err = DirectorError::permanent("registerRuntime", "invalid label");
        assert_eq!(
            err.to_string(),
            "Director registerRuntime failed: invalid label"
        );
    }

    #[test]
    fn test_validation_errors_are_permanent() {
        assert!(ConfigureError::InvalidKubeconfig("garbage".to_string()).is_permanent());
        assert!(ConfigureError::InvalidToken("too long".to_string()).is_permanent());
        assert!(ConfigureError::ConnectorUrlMismatch {
            url: "https://evil.example.com".to_string(),
            pattern: "connector.kyma".to_string(),
        }
        .is_permanent());
    }

    #[test]
    fn test_director_configure_error_follows_source() {
        let transient = ConfigureError::Director(retried(DirectorError::transient(
            "requestOneTimeTokenForRuntime",
            "503",
        )));
        assert!(!transient.is_permanent());

        let permanent = ConfigureError::Director(retried(DirectorError::permanent(
            "requestOneTimeTokenForRuntime",
            "400",
        )));
        assert!(permanent.is_permanent());
    }

    #[test]
    fn test_target_cluster_error_follows_kube_classification() {
        assert!(!ConfigureError::TargetCluster(retried(api_error(503, "ServiceUnavailable")))
            .is_permanent());
        assert!(ConfigureError::TargetCluster(retried(api_error(403, "Forbidden"))).is_permanent());
    }

    #[test]
    fn test_store_error_from_write_conflict() {
        let err = StoreError::from_write(api_error(409, "Conflict"), "kcp-system", "all-good");
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "CompassManagerMapping kcp-system/all-good was modified concurrently"
        );
    }

    #[test]
    fn test_store_error_from_write_already_exists() {
        let err = StoreError::from_write(api_error(409, "AlreadyExists"), "kcp-system", "all-good");
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_store_error_from_write_other() {
        let err = StoreError::from_write(api_error(500, "InternalError"), "kcp-system", "all-good");
        assert!(matches!(err, StoreError::Kube(_)));
        assert!(!err.is_conflict());
    }
}
