//! Shared kubelet argument rendering for the script-based families.
//!
//! Flags are only emitted for configuration that was explicitly set; the
//! bootstrap agents on the images carry their own defaults and we must not
//! shadow them.

use launch_options::{KubeletConfiguration, Taint};
use std::collections::BTreeMap;

/// Labels under this domain (or any subdomain of it) are reserved for the
/// API server; the node's bootstrap agent is not permitted to set them.
pub const RESTRICTED_LABEL_DOMAIN: &str = "node-restriction.kubernetes.io";

pub fn is_restricted_label(key: &str) -> bool {
    let domain = key.split('/').next().unwrap_or_default();
    domain == RESTRICTED_LABEL_DOMAIN
        || domain
            .strip_suffix(RESTRICTED_LABEL_DOMAIN)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Render `--node-labels` input, dropping restricted labels.
pub fn node_labels(labels: &BTreeMap<String, String>) -> Option<String> {
    let rendered = labels
        .iter()
        .filter(|(key, _)| !is_restricted_label(key))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",");
    (!rendered.is_empty()).then_some(rendered)
}

fn join_pairs(map: &BTreeMap<String, String>, separator: char) -> String {
    map.iter()
        .map(|(key, value)| format!("{}{}{}", key, separator, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// The kubelet arguments both the shell and Windows bootstrap scripts pass
/// through their extra-args escape hatch.
pub fn kubelet_extra_args(
    kubelet: &KubeletConfiguration,
    taints: &[Taint],
    labels: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(labels) = node_labels(labels) {
        args.push(format!("--node-labels={}", labels));
    }
    if !taints.is_empty() {
        let taints = taints
            .iter()
            .map(Taint::to_string)
            .collect::<Vec<_>>()
            .join(",");
        args.push(format!("--register-with-taints={}", taints));
    }
    if let Some(max_pods) = kubelet.max_pods {
        args.push(format!("--max-pods={}", max_pods));
    }
    if let Some(pods_per_core) = kubelet.pods_per_core {
        args.push(format!("--pods-per-core={}", pods_per_core));
    }
    if !kubelet.system_reserved.is_empty() {
        args.push(format!(
            "--system-reserved={}",
            join_pairs(&kubelet.system_reserved, '=')
        ));
    }
    if !kubelet.kube_reserved.is_empty() {
        args.push(format!(
            "--kube-reserved={}",
            join_pairs(&kubelet.kube_reserved, '=')
        ));
    }
    if !kubelet.eviction_hard.is_empty() {
        args.push(format!(
            "--eviction-hard={}",
            join_pairs(&kubelet.eviction_hard, '<')
        ));
    }
    if !kubelet.eviction_soft.is_empty() {
        args.push(format!(
            "--eviction-soft={}",
            join_pairs(&kubelet.eviction_soft, '<')
        ));
    }
    if !kubelet.eviction_soft_grace_period.is_empty() {
        args.push(format!(
            "--eviction-soft-grace-period={}",
            join_pairs(&kubelet.eviction_soft_grace_period, '=')
        ));
    }
    if let Some(period) = kubelet.eviction_max_pod_grace_period {
        args.push(format!("--eviction-max-pod-grace-period={}", period));
    }
    if let Some(percent) = kubelet.image_gc_high_threshold_percent {
        args.push(format!("--image-gc-high-threshold={}", percent));
    }
    if let Some(percent) = kubelet.image_gc_low_threshold_percent {
        args.push(format!("--image-gc-low-threshold={}", percent));
    }
    if let Some(enabled) = kubelet.cpu_cfs_quota {
        args.push(format!("--cpu-cfs-quota={}", enabled));
    }

    args
}
