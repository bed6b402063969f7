//! Scripted collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::types::{Instance, ServiceInfo, ServiceKey};
use crate::cache::DiskCache;
use crate::config::ReactorConfig;
use crate::proxy::NamingProxy;
use crate::reactor::HostReactor;
use crate::subscriber::SubscriptionSink;

pub const PUSH_PORT: u16 = 5353;

/// Service document with `hosts` instances on 10.0.0.x:8080.
pub fn service_json(name: &str, clusters: &str, hosts: usize, cache_millis: u64) -> String {
    serde_json::to_string(&service(name, clusters, hosts, cache_millis)).unwrap()
}

pub fn service(name: &str, clusters: &str, hosts: usize, cache_millis: u64) -> ServiceInfo {
    let mut service = ServiceInfo::placeholder(name, clusters);
    service.cache_millis = cache_millis;
    service.hosts = (0..hosts)
        .map(|i| Instance::new(format!("10.0.0.{}", i + 1), 8080))
        .collect();
    service
}

#[derive(Default)]
pub struct MockProxy {
    single: Mutex<HashMap<String, Result<String, String>>>,
    multi: Mutex<Option<Result<String, String>>>,
    all: Mutex<Option<Result<String, String>>>,
    delay: Mutex<Option<Duration>>,
    pub single_calls: Mutex<Vec<(String, String, u16)>>,
    pub multi_calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockProxy {
    pub fn reply(&self, name: &str, payload: String) {
        self.single.lock().unwrap().insert(name.to_string(), Ok(payload));
    }

    pub fn fail(&self, name: &str) {
        self.single.lock().unwrap().insert(name.to_string(), Err("connection refused".to_string()));
    }

    pub fn reply_multi(&self, payload: String) {
        *self.multi.lock().unwrap() = Some(Ok(payload));
    }

    pub fn fail_multi(&self) {
        *self.multi.lock().unwrap() = Some(Err("connection refused".to_string()));
    }

    pub fn reply_all(&self, payload: Result<String, String>) {
        *self.all.lock().unwrap() = Some(payload);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.single_calls.lock().unwrap().iter().filter(|(n, _, _)| n == name).count()
    }

    async fn track<T>(&self, reply: Result<T, String>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.map_err(|e| anyhow!(e))
    }
}

#[async_trait]
impl NamingProxy for MockProxy {
    async fn query_list(
        &self,
        service_name: &str,
        clusters: &str,
        udp_port: u16,
        _healthy_only: bool,
    ) -> Result<String> {
        self.single_calls
            .lock()
            .unwrap()
            .push((service_name.to_string(), clusters.to_string(), udp_port));
        let reply = self
            .single
            .lock()
            .unwrap()
            .get(service_name)
            .cloned()
            .unwrap_or_else(|| Ok(String::new()));
        self.track(reply).await
    }

    async fn query_list_multi_group(
        &self,
        service_names: &str,
        _clusters: &HashMap<String, String>,
        _udp_port: u16,
        _healthy_only: bool,
        _find_back: bool,
    ) -> Result<String> {
        self.multi_calls.lock().unwrap().push(service_names.to_string());
        let reply = self.multi.lock().unwrap().clone().unwrap_or_else(|| Ok(String::new()));
        self.track(reply).await
    }

    async fn get_all_service_info_list(
        &self,
        _namespace: &str,
        _group: &str,
        _clusters: &str,
    ) -> Result<String> {
        let reply = self.all.lock().unwrap().clone().unwrap_or_else(|| Ok(String::new()));
        self.track(reply).await
    }
}

#[derive(Default)]
pub struct MemoryDisk {
    pub preload: Mutex<HashMap<ServiceKey, ServiceInfo>>,
    pub writes: Mutex<Vec<ServiceInfo>>,
}

#[async_trait]
impl DiskCache for MemoryDisk {
    async fn read_all(&self) -> Result<HashMap<ServiceKey, ServiceInfo>> {
        Ok(self.preload.lock().unwrap().clone())
    }

    async fn write_one(&self, service: &ServiceInfo) -> Result<()> {
        self.writes.lock().unwrap().push(service.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub changed: Mutex<Vec<ServiceInfo>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.changed.lock().unwrap().len()
    }
}

impl SubscriptionSink for RecordingSink {
    fn service_changed(&self, service: &ServiceInfo) {
        self.changed.lock().unwrap().push(service.clone());
    }
}

pub struct Harness {
    pub reactor: Arc<HostReactor>,
    pub proxy: Arc<MockProxy>,
    pub disk: Arc<MemoryDisk>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(config: ReactorConfig) -> Harness {
    let proxy = Arc::new(MockProxy::default());
    let disk = Arc::new(MemoryDisk::default());
    let sink = Arc::new(RecordingSink::default());
    let reactor = Arc::new(HostReactor::new(
        config,
        proxy.clone(),
        disk.clone(),
        sink.clone(),
        PUSH_PORT,
    ));
    Harness { reactor, proxy, disk, sink }
}

pub fn test_config(update_cache_when_empty: bool) -> ReactorConfig {
    ReactorConfig {
        update_cache_when_empty,
        not_load_cache_at_start: true,
        ..Default::default()
    }
}
