//! Concurrent snapshot store.
//!
//! Two `DashMap`s keyed by [`ServiceKey`]: the current snapshot of every
//! known service and the wall-clock millis of its last accepted refresh.
//! Snapshots are held behind `Arc`, so a reader either sees the old value or
//! the new one, never a mix.

use std::sync::Arc;
use chrono::Utc;
use dashmap::DashMap;
use shared::types::{ServiceInfo, ServiceKey};

#[derive(Debug, Default)]
pub struct SnapshotStore {
    services: DashMap<ServiceKey, Arc<ServiceInfo>>,
    refreshed_at: DashMap<ServiceKey, u64>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ServiceKey) -> Option<Arc<ServiceInfo>> {
        self.services.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn set(&self, key: ServiceKey, service: impl Into<Arc<ServiceInfo>>) {
        self.services.insert(key, service.into());
    }

    /// Point-in-time copy of every entry. Writers racing with the copy may or
    /// may not be reflected in it.
    pub fn items(&self) -> Vec<(ServiceKey, Arc<ServiceInfo>)> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Millis of the last accepted refresh, 0 if the key was never refreshed.
    pub fn last_refresh(&self, key: &ServiceKey) -> u64 {
        self.refreshed_at.get(key).map(|entry| *entry.value()).unwrap_or(0)
    }

    pub fn stamp(&self, key: ServiceKey, millis: u64) {
        self.refreshed_at.insert(key, millis);
    }

    /// Replaces the snapshot and stamps its refresh time.
    pub fn commit(&self, key: ServiceKey, service: impl Into<Arc<ServiceInfo>>, millis: u64) {
        self.services.insert(key.clone(), service.into());
        self.refreshed_at.insert(key, millis);
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
