// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! GraphQL-over-HTTP implementation of [`DirectorClient`].
//!
//! Every request is a `POST` of `{"query", "variables"}` to the Director endpoint,
//! scoped to a tenant through the `Tenant` header and authenticated with a bearer
//! token from [`OAuthTokenSource`].
//!
//! # Error classification
//!
//! | Failure | Kind |
//! |---------|------|
//! | connect error, timeout | transient |
//! | HTTP 429, 500, 502, 503, 504 | transient |
//! | any other non-2xx status | permanent |
//! | GraphQL error flagged `NotFound` | not found |
//! | any other GraphQL error | transient |

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::oauth::OAuthTokenSource;
use super::{
    DirectorClient, OneTimeToken, RuntimeLabels, OP_REGISTER_RUNTIME,
    OP_REQUEST_ONE_TIME_TOKEN, OP_UNREGISTER_RUNTIME,
};
use crate::constants::DIRECTOR_TENANT_HEADER;
use crate::errors::DirectorError;
use crate::labels::MANAGED_BY_COMPASS_MANAGER;
use crate::metrics;
use crate::reconcilers::retry::is_retryable_http_status;

const REGISTER_RUNTIME_MUTATION: &str =
    "mutation ($in: RuntimeRegisterInput!) { result: registerRuntime(in: $in) { id } }";
const UNREGISTER_RUNTIME_MUTATION: &str =
    "mutation ($id: ID!) { result: unregisterRuntime(id: $id) { id } }";
const REQUEST_ONE_TIME_TOKEN_MUTATION: &str =
    "mutation ($id: ID!) { result: requestOneTimeTokenForRuntime(id: $id) { token connectorURL } }";

/// Error code the Director attaches to "object not found" GraphQL errors.
const DIRECTOR_NOT_FOUND: &str = "NotFound";

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<ResultData<T>>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct ResultData<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Deserialize)]
struct GraphqlErrorExtensions {
    #[serde(default)]
    error: Option<String>,
}

impl GraphqlError {
    fn is_not_found(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.error.as_deref())
            == Some(DIRECTOR_NOT_FOUND)
    }
}

#[derive(Deserialize)]
struct RuntimeId {
    id: String,
}

/// Director client speaking GraphQL over HTTPS.
pub struct GraphqlDirectorClient {
    http: reqwest::Client,
    endpoint: Url,
    tokens: OAuthTokenSource,
}

impl GraphqlDirectorClient {
    /// Create a client. Per-call timeouts are taken from `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: Url, tokens: OAuthTokenSource) -> Self {
        Self {
            http,
            endpoint,
            tokens,
        }
    }

    /// Run one GraphQL operation and record its outcome.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        tenant: &str,
        query: &str,
        variables: Value,
    ) -> Result<Option<T>, DirectorError> {
        let start = Instant::now();
        let result = self.execute_internal(operation, tenant, query, variables).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(DirectorError::NotFound { .. }) => "not_found",
            Err(DirectorError::Transient { .. }) => "transient_error",
            Err(DirectorError::Permanent { .. }) => "permanent_error",
        };
        metrics::record_director_call(operation, outcome);
        debug!(
            operation = operation,
            outcome = outcome,
            elapsed = ?start.elapsed(),
            "Director call finished"
        );

        result
    }

    async fn execute_internal<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        tenant: &str,
        query: &str,
        variables: Value,
    ) -> Result<Option<T>, DirectorError> {
        let access_token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(DIRECTOR_TENANT_HEADER, tenant)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DirectorError::permanent(operation, e.to_string())
                } else {
                    DirectorError::transient(operation, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                operation = operation,
                status = %status,
                "Director returned an HTTP error"
            );
            let message = format!("HTTP {status}: {body}");
            return Err(if is_retryable_http_status(status) {
                DirectorError::transient(operation, message)
            } else {
                DirectorError::permanent(operation, message)
            });
        }

        let envelope: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| DirectorError::permanent(operation, format!("invalid response: {e}")))?;

        if let Some(first) = envelope.errors.first() {
            let message = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(if first.is_not_found() {
                DirectorError::not_found(operation, message)
            } else {
                DirectorError::transient(operation, message)
            });
        }

        Ok(envelope.data.and_then(|data| data.result))
    }
}

/// Build the `RuntimeRegisterInput` for a runtime.
fn register_input(labels: &RuntimeLabels) -> Value {
    json!({
        "name": labels.runtime_name(),
        "description": format!("{} Kyma Runtime", labels.runtime_name()),
        "labels": {
            "global_account_id": labels.global_account_id,
            "gardenerClusterName": labels.shoot_name,
            "kyma_name": labels.kyma_name,
            "director_conn_managed_by": MANAGED_BY_COMPASS_MANAGER,
        }
    })
}

#[async_trait::async_trait]
impl DirectorClient for GraphqlDirectorClient {
    async fn register_in_compass(&self, labels: &RuntimeLabels) -> Result<String, DirectorError> {
        let runtime: Option<RuntimeId> = self
            .execute(
                OP_REGISTER_RUNTIME,
                &labels.global_account_id,
                REGISTER_RUNTIME_MUTATION,
                json!({ "in": register_input(labels) }),
            )
            .await?;

        match runtime {
            Some(runtime) if !runtime.id.is_empty() => Ok(runtime.id),
            _ => Err(DirectorError::permanent(
                OP_REGISTER_RUNTIME,
                "Director returned an empty runtime ID",
            )),
        }
    }

    async fn deregister_from_compass(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<(), DirectorError> {
        let result: Result<Option<RuntimeId>, _> = self
            .execute(
                OP_UNREGISTER_RUNTIME,
                global_account,
                UNREGISTER_RUNTIME_MUTATION,
                json!({ "id": compass_id }),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(DirectorError::NotFound { .. }) => {
                debug!(compass_id = %compass_id, "Runtime already absent from Director");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_compass_token(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<OneTimeToken, DirectorError> {
        let token: Option<OneTimeToken> = self
            .execute(
                OP_REQUEST_ONE_TIME_TOKEN,
                global_account,
                REQUEST_ONE_TIME_TOKEN_MUTATION,
                json!({ "id": compass_id }),
            )
            .await?;

        token.ok_or_else(|| {
            DirectorError::permanent(OP_REQUEST_ONE_TIME_TOKEN, "Director returned no token")
        })
    }
}

#[cfg(test)]
#[path = "graphql_tests.rs"]
mod graphql_tests;
