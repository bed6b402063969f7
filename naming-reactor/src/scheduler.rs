use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::reactor::HostReactor;
use crate::store::now_millis;

/// Background refresh loop. Every pass walks the store and refreshes each
/// entry whose last refresh is older than its own `cache_millis`. At most
/// `width` refreshes run at once; when the pool is exhausted the pass waits.
pub struct UpdateScheduler {
    reactor: Arc<HostReactor>,
    permits: Arc<Semaphore>,
    width: usize,
    interval: Duration,
}

impl UpdateScheduler {
    pub fn new(reactor: Arc<HostReactor>, width: usize, interval: Duration) -> Self {
        let width = width.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            reactor,
            permits: Arc::new(Semaphore::new(width)),
            width,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            width = self.width,
            interval_ms = self.interval.as_millis() as u64,
            "Update scheduler started"
        );

        loop {
            if !self.scan(&cancel).await {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("Update scheduler stopped");
    }

    /// One pass over the store. Returns false if cancelled mid-pass.
    async fn scan(&self, cancel: &CancellationToken) -> bool {
        let store = self.reactor.store();
        let mut dispatched = 0usize;

        for (key, service) in store.items() {
            let elapsed = now_millis().saturating_sub(store.last_refresh(&key));
            if elapsed <= service.cache_millis {
                continue;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return false,
                },
                _ = cancel.cancelled() => return false,
            };

            let reactor = Arc::clone(&self.reactor);
            tokio::spawn(async move {
                // Released when the task ends, whatever the outcome
                let _permit = permit;
                reactor.update_service_now(&service.name, &service.clusters).await;
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            tracing::debug!(dispatched, "Dispatched refreshes");
        }
        true
    }
}
