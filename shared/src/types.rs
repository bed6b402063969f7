use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::protocol::{DEFAULT_CACHE_MILLIS, KEY_SEPARATOR};

/// Identity of a cached service: the service name scoped by its cluster list.
///
/// The clusters component is normalized on construction, so "b,a" and "a, b"
/// address the same entry. An empty clusters string means "all clusters".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    name: String,
    clusters: String,
}

impl ServiceKey {
    pub fn new(name: &str, clusters: &str) -> Self {
        Self {
            name: name.to_string(),
            clusters: normalize_clusters(clusters),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clusters(&self) -> &str {
        &self.clusters
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clusters.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.clusters)
        }
    }
}

/// Sorted, de-duplicated, comma-joined cluster names.
pub fn normalize_clusters(clusters: &str) -> String {
    let mut parts: Vec<&str> = clusters
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    parts.sort_unstable();
    parts.dedup();
    parts.join(",")
}

/// One network endpoint backing a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub instance_id: String,

    pub ip: String,

    pub port: u16,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_true")]
    pub healthy: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub ephemeral: bool,

    #[serde(default)]
    pub cluster_name: String,

    #[serde(default)]
    pub service_name: String,

    /// Free-form key-value pairs attached by the registering application
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            instance_id: String::new(),
            ip: ip.into(),
            port,
            weight: default_weight(),
            healthy: true,
            enabled: true,
            ephemeral: false,
            cluster_name: String::new(),
            service_name: String::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Total order over every field of an instance. Two instances compare
/// `Equal` exactly when all of their fields match.
pub fn instance_order(a: &Instance, b: &Instance) -> Ordering {
    a.ip.cmp(&b.ip)
        .then(a.port.cmp(&b.port))
        .then_with(|| a.instance_id.cmp(&b.instance_id))
        .then_with(|| a.cluster_name.cmp(&b.cluster_name))
        .then_with(|| a.service_name.cmp(&b.service_name))
        .then_with(|| a.weight.total_cmp(&b.weight))
        .then(a.healthy.cmp(&b.healthy))
        .then(a.enabled.cmp(&b.enabled))
        .then(a.ephemeral.cmp(&b.ephemeral))
        .then_with(|| a.metadata.cmp(&b.metadata))
}

/// Compares two host lists as multisets: same members with the same
/// attributes, in any order.
pub fn hosts_equal(a: &[Instance], b: &[Instance]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut left: Vec<&Instance> = a.iter().collect();
    let mut right: Vec<&Instance> = b.iter().collect();
    left.sort_by(|x, y| instance_order(x, y));
    right.sort_by(|x, y| instance_order(x, y));

    left.iter()
        .zip(right.iter())
        .all(|(x, y)| instance_order(x, y) == Ordering::Equal)
}

/// Snapshot of one service as delivered by the naming backend.
/// Never mutated after construction; refreshes replace the whole value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub group_name: String,

    #[serde(default)]
    pub clusters: String,

    /// Staleness budget chosen by the backend for this service
    #[serde(default = "default_cache_millis")]
    pub cache_millis: u64,

    #[serde(default)]
    pub hosts: Vec<Instance>,

    #[serde(default)]
    pub last_ref_time: u64,

    #[serde(default)]
    pub checksum: String,
}

impl ServiceInfo {
    /// Zero-instance entry standing in for a service that has not been
    /// resolved yet.
    pub fn placeholder(name: &str, clusters: &str) -> Self {
        Self {
            name: name.to_string(),
            clusters: clusters.to_string(),
            cache_millis: DEFAULT_CACHE_MILLIS,
            ..Default::default()
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.name, &self.clusters)
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_cache_millis() -> u64 {
    DEFAULT_CACHE_MILLIS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(ip: &str, port: u16) -> Instance {
        Instance::new(ip, port)
    }

    #[test]
    fn test_key_deterministic() {
        let a = ServiceKey::new("orders", "c1,c2");
        let b = ServiceKey::new("orders", "c1,c2");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "orders@@c1,c2");
        assert_eq!(ServiceKey::new("orders", "").to_string(), "orders");
    }

    #[test]
    fn test_key_normalizes_clusters() {
        assert_eq!(ServiceKey::new("orders", "c2, c1,,c1"), ServiceKey::new("orders", "c1,c2"));
        assert_eq!(ServiceKey::new("orders", " , "), ServiceKey::new("orders", ""));
    }

    #[test]
    fn test_key_components_do_not_collide() {
        // Rendered identically, but distinct services
        let a = ServiceKey::new("a@@b", "");
        let b = ServiceKey::new("a", "b");
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn test_hosts_equal_ignores_order() {
        let a = vec![host("10.0.0.1", 80), host("10.0.0.2", 80)];
        let b = vec![host("10.0.0.2", 80), host("10.0.0.1", 80)];
        assert!(hosts_equal(&a, &b));
    }

    #[test]
    fn test_hosts_equal_detects_attribute_change() {
        let a = vec![host("10.0.0.1", 80)];
        let mut changed = host("10.0.0.1", 80);
        changed.healthy = false;
        assert!(!hosts_equal(&a, &[changed.clone()]));

        changed.healthy = true;
        changed.metadata.insert("zone".to_string(), "b".to_string());
        assert!(!hosts_equal(&a, &[changed]));
    }

    #[test]
    fn test_hosts_equal_counts_duplicates() {
        let a = vec![host("10.0.0.1", 80), host("10.0.0.1", 80)];
        let b = vec![host("10.0.0.1", 80), host("10.0.0.2", 80)];
        assert!(!hosts_equal(&a, &b));
        assert!(!hosts_equal(&a, &a[..1]));
    }

    #[test]
    fn test_placeholder_has_no_hosts() {
        let p = ServiceInfo::placeholder("orders", "");
        assert!(p.hosts.is_empty());
        assert_eq!(p.cache_millis, DEFAULT_CACHE_MILLIS);
        assert_eq!(p.key(), ServiceKey::new("orders", ""));
    }
}
