// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Small in-memory state shared by all reconciliations.
//!
//! - [`KeyLocks`] serialises reconciliations per runtime key across both controllers.
//! - [`ModuleTracker`] remembers whether the Application Connector module was
//!   enabled at the last successful pass, to detect re-enable edges.
//! - [`PendingRegistrations`] holds a Compass ID that the Director issued but that
//!   could not be persisted yet, so the next pass reuses it instead of registering
//!   the runtime a second time.
//!
//! None of this survives a restart. Losing module snapshots suppresses one edge;
//! losing a pending registration can leave one orphaned Compass runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::crd::Kyma;
use crate::labels::MODULE_STATE_PROCESSING;

/// Drop idle lock entries once the table grows past this size.
const KEY_LOCKS_PRUNE_THRESHOLD: usize = 1024;

/// `(namespace, name)` shared by a Kyma and its mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeKey {
    pub namespace: String,
    pub name: String,
}

impl RuntimeKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RuntimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Per-key async locks.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<RuntimeKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    /// Wait until no other reconciliation holds `key`, then hold it until the
    /// guard is dropped.
    pub async fn lock(&self, key: &RuntimeKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > KEY_LOCKS_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Result of looking at a Kyma's module list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleObservation {
    /// The Application Connector is listed and not being removed
    pub enabled: bool,
    /// The module came back since the last committed snapshot
    pub re_enabled: bool,
}

/// Last-seen Application Connector state per runtime.
#[derive(Default)]
pub struct ModuleTracker {
    snapshots: Mutex<HashMap<RuntimeKey, bool>>,
}

impl ModuleTracker {
    /// Compare the Kyma's modules with the committed snapshot without updating it.
    ///
    /// A re-enable edge needs a snapshot saying "disabled" and the module now listed
    /// in `Processing`. Without a snapshot (first pass after a restart) there is no edge.
    #[must_use]
    pub fn observe(&self, key: &RuntimeKey, kyma: &Kyma) -> ModuleObservation {
        let enabled = kyma.application_connector_enabled();
        let processing = kyma
            .application_connector()
            .is_some_and(|module| module.state == MODULE_STATE_PROCESSING);

        let previous = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied();

        ModuleObservation {
            enabled,
            re_enabled: previous == Some(false) && processing,
        }
    }

    /// Record the module state seen by a pass that completed.
    pub fn commit(&self, key: &RuntimeKey, enabled: bool) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), enabled);
    }

    pub fn forget(&self, key: &RuntimeKey) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Compass IDs issued by the Director but not yet stored on the mapping.
#[derive(Default)]
pub struct PendingRegistrations {
    ids: Mutex<HashMap<RuntimeKey, String>>,
}

impl PendingRegistrations {
    #[must_use]
    pub fn get(&self, key: &RuntimeKey) -> Option<String> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: &RuntimeKey, compass_id: &str) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), compass_id.to_string());
    }

    pub fn remove(&self, key: &RuntimeKey) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
#[path = "tracking_tests.rs"]
mod tracking_tests;
