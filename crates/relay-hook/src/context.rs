//! Per-transaction state.

use crate::config::RelaySettings;
use relay_core::Catalog;
use relay_delta::{DeltaStore, MutationRecorder};

/// Everything one top-level transaction accumulates.
///
/// Created on the first lifecycle call of a transaction and dropped when it
/// ends, so nothing leaks from one transaction into the next.
#[derive(Debug)]
pub struct TransactionContext {
    settings: RelaySettings,
    store: DeltaStore,
}

impl TransactionContext {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            store: DeltaStore::new(),
        }
    }

    /// Settings as they were when the transaction started.
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn store(&self) -> &DeltaStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DeltaStore {
        &mut self.store
    }

    pub fn recorder<'a, C: Catalog + ?Sized>(&'a mut self, catalog: &'a C) -> MutationRecorder<'a, C> {
        MutationRecorder::new(&mut self.store, catalog, &self.settings.privileged_role_name)
    }
}
