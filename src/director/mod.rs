// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Director (Compass registry) access.
//!
//! The reconciler only ever sees the [`DirectorClient`] trait. The production
//! implementation is [`graphql::GraphqlDirectorClient`], which speaks GraphQL over
//! HTTPS and authenticates with an OAuth2 client-credentials token from
//! [`oauth::OAuthTokenSource`].
//!
//! Every call is independent: no session, no ordering guarantees. The client is
//! shared by all reconciliations and must be safe for concurrent use.
//!
//! # Example
//!
//! ```rust,no_run
//! use compass_manager::director::{DirectorClient, RuntimeLabels};
//!
//! # async fn example(director: &dyn DirectorClient) -> anyhow::Result<()> {
//! let labels = RuntimeLabels {
//!     global_account_id: "ga-1".to_string(),
//!     shoot_name: "c-12345".to_string(),
//!     kyma_name: "all-good".to_string(),
//! };
//! let compass_id = director.register_in_compass(&labels).await?;
//! let token = director.refresh_compass_token(&compass_id, &labels.global_account_id).await?;
//! println!("connector at {}", token.connector_url);
//! # Ok(())
//! # }
//! ```

pub mod graphql;
pub mod oauth;

use crate::crd::Kyma;
use crate::errors::DirectorError;
use serde::Deserialize;

/// Director operation names, used for logs, errors and metrics.
pub const OP_REGISTER_RUNTIME: &str = "registerRuntime";
pub const OP_UNREGISTER_RUNTIME: &str = "unregisterRuntime";
pub const OP_REQUEST_ONE_TIME_TOKEN: &str = "requestOneTimeTokenForRuntime";

/// Identity of a runtime as copied from its Kyma resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeLabels {
    pub global_account_id: String,
    pub shoot_name: String,
    pub kyma_name: String,
}

impl RuntimeLabels {
    #[must_use]
    pub fn from_kyma(kyma: &Kyma) -> Self {
        Self {
            global_account_id: kyma.global_account_id(),
            shoot_name: kyma.shoot_name(),
            kyma_name: kyma.kyma_name(),
        }
    }

    /// Runtime name shown in Compass: the shoot name, or the Kyma name without one.
    #[must_use]
    pub fn runtime_name(&self) -> &str {
        if self.shoot_name.is_empty() {
            &self.kyma_name
        } else {
            &self.shoot_name
        }
    }
}

/// Short-lived bootstrap credential for the Compass runtime agent.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct OneTimeToken {
    #[serde(rename = "connectorURL")]
    pub connector_url: String,
    pub token: String,
}

// The token is a credential; keep it out of debug output.
impl std::fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimeToken")
            .field("connector_url", &self.connector_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Remote operations on the Director.
#[async_trait::async_trait]
pub trait DirectorClient: Send + Sync {
    /// Register a runtime and return its Compass ID.
    async fn register_in_compass(&self, labels: &RuntimeLabels) -> Result<String, DirectorError>;

    /// Remove a runtime. A runtime that is already gone counts as success.
    async fn deregister_from_compass(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<(), DirectorError>;

    /// Issue a fresh one-time token for the runtime agent.
    async fn refresh_compass_token(
        &self,
        compass_id: &str,
        global_account: &str,
    ) -> Result<OneTimeToken, DirectorError>;
}
