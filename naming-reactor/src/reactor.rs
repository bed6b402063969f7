//! Host reactor: the local view of which instances back each service.
//!
//! Pull refreshes (scheduler, cache misses) and push deliveries both end in
//! [`HostReactor::process_service_json`], which decides whether a payload is
//! accepted, whether it is a change worth publishing, and commits it to the
//! [`SnapshotStore`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use shared::protocol;
use shared::types::{hosts_equal, ServiceInfo, ServiceKey};
use crate::cache::DiskCache;
use crate::config::ReactorConfig;
use crate::proxy::NamingProxy;
use crate::push::receiver::PushEvent;
use crate::scheduler::UpdateScheduler;
use crate::store::{now_millis, SnapshotStore};
use crate::subscriber::SubscriptionSink;

/// What the change detector did with one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Unparseable or nameless payload, nothing touched
    Rejected,
    /// Empty host list for a cached service while empty updates are disabled
    IgnoredEmpty,
    /// Same hosts as the cached snapshot; stored and stamped, not published
    Unchanged,
    /// New or different snapshot; persisted, published, stored and stamped
    Changed,
}

pub struct HostReactor {
    store: SnapshotStore,
    proxy: Arc<dyn NamingProxy>,
    disk: Arc<dyn DiskCache>,
    sink: Arc<dyn SubscriptionSink>,
    config: ReactorConfig,
    push_port: u16,
}

impl HostReactor {
    pub fn new(
        config: ReactorConfig,
        proxy: Arc<dyn NamingProxy>,
        disk: Arc<dyn DiskCache>,
        sink: Arc<dyn SubscriptionSink>,
        push_port: u16,
    ) -> Self {
        Self {
            store: SnapshotStore::new(),
            proxy,
            disk,
            sink,
            config,
            push_port,
        }
    }

    /// Build a reactor and, unless disabled, seed it from the disk cache.
    pub async fn open(
        config: ReactorConfig,
        proxy: Arc<dyn NamingProxy>,
        disk: Arc<dyn DiskCache>,
        sink: Arc<dyn SubscriptionSink>,
        push_port: u16,
    ) -> Arc<Self> {
        let load = !config.not_load_cache_at_start;
        let reactor = Self::new(config, proxy, disk, sink, push_port);
        if load {
            reactor.load_cache_from_disk().await;
        }
        Arc::new(reactor)
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn push_port(&self) -> u16 {
        self.push_port
    }

    /// Copy every persisted snapshot into the store. Loaded entries carry no
    /// refresh stamp, so the first scheduler pass refreshes them.
    pub async fn load_cache_from_disk(&self) {
        match self.disk.read_all().await {
            Ok(services) => {
                let count = services.len();
                for (key, service) in services {
                    self.store.set(key, service);
                }
                tracing::info!(count, "Loaded services from disk cache");
            }
            Err(e) => {
                tracing::error!("Failed to load services from disk cache: {:#}", e);
            }
        }
    }

    /// Start the background refresh loop. It runs until `cancel` fires.
    pub fn start_scheduler(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        UpdateScheduler::new(
            Arc::clone(self),
            self.config.permit_width(),
            std::time::Duration::from_millis(self.config.refresh_interval_ms),
        )
        .spawn(cancel)
    }

    /// Change detector shared by pull refresh and push ingest.
    pub async fn process_service_json(&self, raw: &str) -> ProcessOutcome {
        let Some(service) = protocol::parse_service(raw) else {
            tracing::warn!(len = raw.len(), "Dropping unparseable service payload");
            return ProcessOutcome::Rejected;
        };

        let key = service.key();
        let old = self.store.get(&key);

        if old.is_some() && !self.config.update_cache_when_empty && service.hosts.is_empty() {
            tracing::error!(service = %key, "Received empty host list, keeping cached snapshot");
            return ProcessOutcome::IgnoredEmpty;
        }

        let changed = match &old {
            None => {
                tracing::info!(service = %key, "Service not found in cache");
                true
            }
            Some(old) => !hosts_equal(&old.hosts, &service.hosts),
        };

        let service = Arc::new(service);
        self.store.commit(key.clone(), Arc::clone(&service), now_millis());

        if !changed {
            tracing::debug!(service = %key, "Service refreshed without changes");
            return ProcessOutcome::Unchanged;
        }

        if old.is_some() {
            tracing::info!(service = %key, hosts = service.hosts.len(), "Service updated");
        }
        if let Err(e) = self.disk.write_one(&service).await {
            tracing::error!(service = %key, "Failed to persist service: {:#}", e);
        }
        if catch_unwind(AssertUnwindSafe(|| self.sink.service_changed(&service))).is_err() {
            tracing::error!(service = %key, "Subscription sink panicked");
        }
        ProcessOutcome::Changed
    }

    /// Cached snapshot for a service. On a miss a placeholder is stored and
    /// the caller waits for one refresh round trip.
    pub async fn get_service_info(&self, name: &str, clusters: &str) -> Arc<ServiceInfo> {
        let key = ServiceKey::new(name, clusters);
        if let Some(service) = self.store.get(&key) {
            return service;
        }

        let placeholder = Arc::new(ServiceInfo::placeholder(name, clusters));
        self.store.set(key.clone(), Arc::clone(&placeholder));
        self.update_service_now(name, clusters).await;

        self.store.get(&key).unwrap_or(placeholder)
    }

    /// Batch lookup. If none of `names` is cached, one batched refresh runs
    /// and the cache pass is retried.
    ///
    /// Two quirks are kept as-is: the result always starts with an empty
    /// sentinel entry, and every hit is replaced in the store (and in the
    /// result) by a zero-host placeholder rather than the cached snapshot.
    pub async fn get_service_infos(
        &self,
        names: &[String],
        clusters_by_name: &HashMap<String, String>,
        find_back: bool,
    ) -> Vec<ServiceInfo> {
        let mut infos = vec![ServiceInfo::default()];

        if !self.collect_cached(names, clusters_by_name, find_back, &mut infos) {
            self.update_services_now(names, clusters_by_name, find_back).await;
            self.collect_cached(names, clusters_by_name, find_back, &mut infos);
        }

        infos
    }

    fn collect_cached(
        &self,
        names: &[String],
        clusters_by_name: &HashMap<String, String>,
        find_back: bool,
        infos: &mut Vec<ServiceInfo>,
    ) -> bool {
        let mut found = false;
        for name in names {
            let clusters = clusters_by_name.get(name).map(String::as_str).unwrap_or("");
            let key = ServiceKey::new(name, clusters);
            if self.store.get(&key).is_none() {
                continue;
            }
            found = true;

            let placeholder = ServiceInfo::placeholder(name, clusters);
            self.store.set(key, placeholder.clone());
            infos.push(placeholder);
            if find_back {
                break;
            }
        }
        found
    }

    /// Every service in a namespace and group, straight from the backend.
    /// Failures are logged and yield an empty list.
    pub async fn get_all_service_info(
        &self,
        namespace: &str,
        group: &str,
        clusters: &str,
    ) -> Vec<ServiceInfo> {
        let result = match self.proxy.get_all_service_info_list(namespace, group, clusters).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(namespace, group, clusters, "Query of all services failed: {:#}", e);
                return Vec::new();
            }
        };
        if result.trim().is_empty() {
            tracing::error!(namespace, group, clusters, "Query of all services returned nothing");
            return Vec::new();
        }

        protocol::parse_service_list(&result).unwrap_or_else(|| {
            tracing::error!(namespace, group, clusters, "Malformed reply to query of all services");
            Vec::new()
        })
    }

    /// Pull one service and feed it through the change detector.
    pub async fn update_service_now(&self, name: &str, clusters: &str) {
        let result = match self.proxy.query_list(name, clusters, self.push_port, false).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(service = name, clusters, "Query list failed: {:#}", e);
                return;
            }
        };
        if result.trim().is_empty() {
            tracing::error!(service = name, clusters, "Query list returned nothing");
            return;
        }

        self.process_service_json(&result).await;
    }

    /// Pull several services in one request; each fragment of the reply is
    /// processed on its own.
    pub async fn update_services_now(
        &self,
        names: &[String],
        clusters_by_name: &HashMap<String, String>,
        find_back: bool,
    ) {
        let joined = names.join(",");
        let result = match self
            .proxy
            .query_list_multi_group(&joined, clusters_by_name, self.push_port, false, find_back)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(services = %joined, "Batched query list failed: {:#}", e);
                return;
            }
        };
        if result.trim().is_empty() {
            tracing::error!(services = %joined, "Batched query list returned nothing");
            return;
        }

        let Some(fragments) = protocol::parse_fragments(&result) else {
            tracing::error!(services = %joined, "Malformed reply to batched query list");
            return;
        };
        for fragment in fragments.iter().filter(|f| !f.is_empty()) {
            self.process_service_json(fragment).await;
        }
    }

    /// JSON object of every cached snapshot keyed by its rendered key.
    pub fn dump(&self) -> String {
        let services: HashMap<String, Arc<ServiceInfo>> = self
            .store
            .items()
            .into_iter()
            .map(|(key, service)| (key.to_string(), service))
            .collect();
        serde_json::to_string(&services).unwrap_or_default()
    }

    /// Push ingest loop: drains events from the push receiver into the
    /// change detector until `cancel` fires.
    pub async fn run_push_ingest(
        &self,
        mut rx: mpsc::Receiver<PushEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    match event {
                        PushEvent::Service(raw) => {
                            let outcome = self.process_service_json(&raw).await;
                            tracing::debug!(?outcome, "Processed pushed service");
                        }
                        PushEvent::Dump(reply) => {
                            let _ = reply.send(self.dump());
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Push ingest shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
