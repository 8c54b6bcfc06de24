//! Concurrent endpoint map with save-on-mutation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::history::HistoryStore;
use super::models::MonitoredEndpoint;
use super::{read_lock, write_lock, StoreError};
use crate::db::SaveHandle;

/// Thread-safe endpoint store.
///
/// Accessors hand out clones. Every mutation (`add`, [`ServiceStore::update`],
/// `delete`) requests a background save.
pub struct ServiceStore {
    services: RwLock<HashMap<String, MonitoredEndpoint>>,
    history: Arc<HistoryStore>,
    save: Option<SaveHandle>,
}

impl ServiceStore {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            history,
            save: None,
        }
    }

    /// Request a save after every mutation.
    pub fn with_save_hook(mut self, save: SaveHandle) -> Self {
        self.save = Some(save);
        self
    }

    fn trigger_save(&self) {
        if let Some(save) = &self.save {
            save.request();
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn add(&self, endpoint: MonitoredEndpoint) -> Result<(), StoreError> {
        {
            let mut services = write_lock(&self.services);
            if services.contains_key(&endpoint.id) {
                return Err(StoreError::AlreadyExists(endpoint.id));
            }
            services.insert(endpoint.id.clone(), endpoint);
        }
        self.trigger_save();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<MonitoredEndpoint, StoreError> {
        read_lock(&self.services)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// All endpoints, newest first.
    pub fn all(&self) -> Vec<MonitoredEndpoint> {
        let mut endpoints: Vec<_> = read_lock(&self.services).values().cloned().collect();
        endpoints.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        endpoints
    }

    /// Update the stored endpoint by running `f` on it under the write lock.
    ///
    /// Calls for the same ID are serialized, so `f` may read and then write
    /// state without another writer slipping in between.
    pub fn update<R, F>(&self, id: &str, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut MonitoredEndpoint) -> R,
    {
        let out = {
            let mut services = write_lock(&self.services);
            let endpoint = services
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            f(endpoint)
        };
        self.trigger_save();
        Ok(out)
    }

    /// Remove an endpoint together with its history.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        {
            let mut services = write_lock(&self.services);
            if services.remove(id).is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }
            // Never-checked endpoints have no history to remove.
            let _ = self.history.delete(id);
        }
        self.trigger_save();
        Ok(())
    }

    pub fn len(&self) -> usize {
        read_lock(&self.services).len()
    }

    pub fn export(&self) -> HashMap<String, MonitoredEndpoint> {
        read_lock(&self.services).clone()
    }

    pub fn import(&self, services: HashMap<String, MonitoredEndpoint>) {
        let services = services
            .into_iter()
            .map(|(id, mut endpoint)| {
                endpoint.id = id.clone();
                (id, endpoint)
            })
            .collect();
        *write_lock(&self.services) = services;
    }
}
