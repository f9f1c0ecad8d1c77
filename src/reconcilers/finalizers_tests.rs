// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::reconcilers::finalizers::finalizer_patch;
    use serde_json::json;

    const TEST_FINALIZER: &str = "operator.kyma-project.io/compass-manager";

    #[test]
    fn test_patch_carries_resource_version() {
        let patch = finalizer_patch(Some("42"), &[TEST_FINALIZER.to_string()]);
        assert_eq!(
            patch,
            json!({
                "metadata": {
                    "resourceVersion": "42",
                    "finalizers": [TEST_FINALIZER]
                }
            })
        );
    }

    #[test]
    fn test_patch_without_resource_version() {
        let patch = finalizer_patch(None, &[TEST_FINALIZER.to_string()]);
        assert!(patch["metadata"].get("resourceVersion").is_none());
        assert_eq!(patch["metadata"]["finalizers"], json!([TEST_FINALIZER]));
    }

    #[test]
    fn test_patch_with_empty_list_clears_finalizers() {
        // An explicit empty list is required; omitting the key would leave them untouched
        let patch = finalizer_patch(Some("7"), &[]);
        assert_eq!(patch["metadata"]["finalizers"], json!([]));
    }
}
