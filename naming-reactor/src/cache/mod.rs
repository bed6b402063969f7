pub mod db;

use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use shared::types::{ServiceInfo, ServiceKey};

/// Disk-backed fallback for the snapshot store.
#[async_trait]
pub trait DiskCache: Send + Sync {
    /// Every snapshot persisted so far. Used once at startup.
    async fn read_all(&self) -> Result<HashMap<ServiceKey, ServiceInfo>>;

    /// Persist one snapshot, replacing any previous copy for its key.
    async fn write_one(&self, service: &ServiceInfo) -> Result<()>;
}
