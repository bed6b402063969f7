use std::collections::HashMap;
use std::thread;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use shared::types::{ServiceInfo, ServiceKey};
use crate::cache::{db::CacheDb, DiskCache};

/// Commands sent to the cache thread
pub enum CacheCommand {
    Write(ServiceInfo, oneshot::Sender<Result<()>>),
    ReadAll(oneshot::Sender<Result<HashMap<ServiceKey, ServiceInfo>>>),
    Shutdown,
}

/// Handle to the database thread. `rusqlite::Connection` is not `Sync`, so
/// the connection lives on one thread and callers talk to it over a channel.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    /// Spawn a new cache thread with the given database
    pub fn spawn(db: CacheDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<CacheCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    CacheCommand::Write(service, reply) => {
                        let _ = reply.send(db.write_service(&service));
                    }
                    CacheCommand::ReadAll(reply) => {
                        let _ = reply.send(db.read_services());
                    }
                    CacheCommand::Shutdown => {
                        tracing::info!("Cache thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Shutdown the cache thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(CacheCommand::Shutdown).await?;
        Ok(())
    }
}

#[async_trait]
impl DiskCache for CacheHandle {
    async fn read_all(&self) -> Result<HashMap<ServiceKey, ServiceInfo>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CacheCommand::ReadAll(reply)).await?;
        rx.await?
    }

    async fn write_one(&self, service: &ServiceInfo) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CacheCommand::Write(service.clone(), reply)).await?;
        rx.await?
    }
}
