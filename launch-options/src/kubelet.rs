//! Kubelet tuning and taints, as supplied by the node-pool configuration.
//! Fields are optional throughout; a value that was never set must never
//! leak a default into rendered user data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

serde_plain::derive_display_from_serialize!(TaintEffect);
serde_plain::derive_fromstr_from_deserialize!(TaintEffect);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: TaintEffect,
}

impl Taint {
    pub fn new<K, V>(key: K, value: V, effect: TaintEffect) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: Some(value.into()),
            effect,
        }
    }
}

impl fmt::Display for Taint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}:{}", self.key, value, self.effect),
            None => write!(f, "{}:{}", self.key, self.effect),
        }
    }
}

/// Kubelet configuration from the node pool.  Reserved-resource and eviction
/// maps keep their Kubernetes quantity/duration strings verbatim; they are
/// rendered into user data as written and only parsed where overhead
/// accounting needs real numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeletConfiguration {
    pub max_pods: Option<u32>,
    pub pods_per_core: Option<u32>,
    /// Resource name to quantity, e.g. `cpu = "500m"`.
    pub kube_reserved: BTreeMap<String, String>,
    pub system_reserved: BTreeMap<String, String>,
    /// Signal name to threshold, e.g. `memory.available = "10%"`.
    pub eviction_hard: BTreeMap<String, String>,
    pub eviction_soft: BTreeMap<String, String>,
    /// Signal name to grace duration, e.g. `memory.available = "1m"`.
    pub eviction_soft_grace_period: BTreeMap<String, String>,
    pub eviction_max_pod_grace_period: Option<i32>,
    pub image_gc_high_threshold_percent: Option<u32>,
    pub image_gc_low_threshold_percent: Option<u32>,
    pub cpu_cfs_quota: Option<bool>,
    pub cluster_dns: Vec<String>,
}

impl KubeletConfiguration {
    pub fn is_empty(&self) -> bool {
        self == &KubeletConfiguration::default()
    }
}

#[cfg(test)]
mod test {
    use super::{KubeletConfiguration, Taint, TaintEffect};
    use std::collections::BTreeMap;

    #[test]
    fn kubelet_configuration_round_trips_through_serde() {
        let mut kube_reserved = BTreeMap::new();
        kube_reserved.insert("cpu".to_string(), "500m".to_string());
        let kubelet = KubeletConfiguration {
            max_pods: Some(110),
            kube_reserved,
            cpu_cfs_quota: Some(false),
            ..Default::default()
        };
        let serialized = serde_json::to_string(&kubelet).unwrap();
        // Field names come out camelCase; unset fields deserialize from
        // absence thanks to the container default.
        assert!(serialized.contains("\"maxPods\":110"));
        let deserialized: KubeletConfiguration = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, kubelet);

        let sparse: KubeletConfiguration = serde_json::from_str("{\"maxPods\": 20}").unwrap();
        assert_eq!(sparse.max_pods, Some(20));
        assert!(sparse.kube_reserved.is_empty());
    }

    #[test]
    fn taint_display() {
        let taint = Taint::new("dedicated", "gpu", TaintEffect::NoSchedule);
        assert_eq!(taint.to_string(), "dedicated=gpu:NoSchedule");

        let bare = Taint {
            key: "maintenance".to_string(),
            value: None,
            effect: TaintEffect::NoExecute,
        };
        assert_eq!(bare.to_string(), "maintenance:NoExecute");
    }
}
