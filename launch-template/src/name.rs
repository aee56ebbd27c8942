//! Deterministic launch template naming.
//!
//! The name is a truncated SHA-256 digest over an explicit canonical
//! serialization of every field that matters to the remote resource.  Fields
//! that cannot change the created template's behavior never enter the
//! digest: tags, node labels, the CA bundle, the node-class name, and custom
//! user data for every family except Custom.  Maps are written in sorted key
//! order; lists that are ordered on the wire (security groups, taints, block
//! devices) are written in declared order.

use launch_options::{
    BlockDeviceSpec, CapacityType, KubeletConfiguration, Options, OsFamily, Taint,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Prefix keeping generated names recognizable to operators.
pub const NAME_PREFIX: &str = "karpenter.k8s.aws/";

const DIGEST_LEN: usize = 16;

// Canonical field framing.  The unit separator ends a key, the record
// separator ends a value, so adjacent fields can never collide by
// concatenation.
const KEY_END: [u8; 1] = [0x1f];
const VALUE_END: [u8; 1] = [0x1e];

/// Everything that identifies one launch template.  Borrowed views only;
/// naming a spec must never require cloning the request.
#[derive(Debug, Clone, Copy)]
pub struct LaunchSpec<'a> {
    pub options: &'a Options,
    pub family: OsFamily,
    pub kubelet: &'a KubeletConfiguration,
    pub taints: &'a [Taint],
    pub block_devices: &'a [BlockDeviceSpec],
    pub capacity_type: CapacityType,
    pub custom_user_data: Option<&'a str>,
    pub image_id: &'a str,
    /// The cluster CIDR actually rendered into the payload, after any
    /// fallback resolution.  Digesting the effective value rather than the
    /// configured one keeps the name in step with what the template says.
    pub cluster_cidr: Option<&'a str>,
}

pub fn launch_template_name(spec: &LaunchSpec<'_>) -> String {
    let mut hasher = Sha256::new();
    write_spec(&mut hasher, spec);
    let digest = hex::encode(hasher.finalize());
    format!("{}{}", NAME_PREFIX, &digest[..DIGEST_LEN])
}

fn write_spec(hasher: &mut Sha256, spec: &LaunchSpec<'_>) {
    let options = spec.options;
    field(hasher, "cluster-name", &options.cluster_name);
    field(hasher, "cluster-endpoint", &options.cluster_endpoint);
    opt_field(hasher, "cluster-cidr", spec.cluster_cidr);
    if let Some(dns_ip) = options.kube_dns_ip {
        field(hasher, "kube-dns-ip", &dns_ip.to_string());
    }
    if let Some(policy) = options.instance_store_policy {
        field(hasher, "instance-store-policy", &policy.to_string());
    }
    for group in &options.security_group_ids {
        field(hasher, "security-group", group);
    }
    if let Some(public_ip) = options.associate_public_ip_address {
        field(hasher, "associate-public-ip", &public_ip.to_string());
    }
    field(hasher, "instance-profile", &options.instance_profile);

    field(hasher, "os-family", &spec.family.to_string());
    field(hasher, "capacity-type", &spec.capacity_type.to_string());
    field(hasher, "image-id", spec.image_id);

    write_kubelet(hasher, spec.kubelet);

    for taint in spec.taints {
        field(hasher, "taint", &taint.to_string());
    }

    for device in spec.block_devices {
        field(hasher, "device-name", &device.device_name);
        field(hasher, "device-root", &device.root_volume.to_string());
        let ebs = &device.ebs;
        if let Some(size) = ebs.volume_size {
            field(hasher, "device-size", &size.bytes().to_string());
        }
        opt_field(hasher, "device-type", ebs.volume_type.as_deref());
        opt_num(hasher, "device-iops", ebs.iops);
        opt_num(hasher, "device-throughput", ebs.throughput);
        opt_field(
            hasher,
            "device-encrypted",
            ebs.encrypted.map(|v| v.to_string()).as_deref(),
        );
        opt_field(hasher, "device-kms-key", ebs.kms_key_id.as_deref());
        opt_field(
            hasher,
            "device-delete-on-termination",
            ebs.delete_on_termination.map(|v| v.to_string()).as_deref(),
        );
        opt_field(hasher, "device-snapshot", ebs.snapshot_id.as_deref());
    }

    // Custom-family payloads go out verbatim, so their content is the
    // configuration.  Everywhere else the rendered payload is a function of
    // fields already digested above plus user data merged at render time.
    if spec.family == OsFamily::Custom {
        opt_field(hasher, "custom-user-data", spec.custom_user_data);
    }
}

fn write_kubelet(hasher: &mut Sha256, kubelet: &KubeletConfiguration) {
    opt_num(hasher, "kubelet-max-pods", kubelet.max_pods);
    opt_num(hasher, "kubelet-pods-per-core", kubelet.pods_per_core);
    map_field(hasher, "kubelet-kube-reserved", &kubelet.kube_reserved);
    map_field(hasher, "kubelet-system-reserved", &kubelet.system_reserved);
    map_field(hasher, "kubelet-eviction-hard", &kubelet.eviction_hard);
    map_field(hasher, "kubelet-eviction-soft", &kubelet.eviction_soft);
    map_field(
        hasher,
        "kubelet-eviction-soft-grace-period",
        &kubelet.eviction_soft_grace_period,
    );
    opt_num(
        hasher,
        "kubelet-eviction-max-pod-grace-period",
        kubelet.eviction_max_pod_grace_period,
    );
    opt_num(
        hasher,
        "kubelet-image-gc-high",
        kubelet.image_gc_high_threshold_percent,
    );
    opt_num(
        hasher,
        "kubelet-image-gc-low",
        kubelet.image_gc_low_threshold_percent,
    );
    opt_field(
        hasher,
        "kubelet-cpu-cfs-quota",
        kubelet.cpu_cfs_quota.map(|v| v.to_string()).as_deref(),
    );
    for dns in &kubelet.cluster_dns {
        field(hasher, "kubelet-cluster-dns", dns);
    }
}

fn field(hasher: &mut Sha256, key: &str, value: &str) {
    hasher.update(key.as_bytes());
    hasher.update(KEY_END);
    hasher.update(value.as_bytes());
    hasher.update(VALUE_END);
}

fn opt_field(hasher: &mut Sha256, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        field(hasher, key, value);
    }
}

fn opt_num<N: ToString>(hasher: &mut Sha256, key: &str, value: Option<N>) {
    if let Some(value) = value {
        field(hasher, key, &value.to_string());
    }
}

// BTreeMap iteration is already sorted, which is exactly the canonical
// order for unordered collections.
fn map_field(hasher: &mut Sha256, key: &str, map: &BTreeMap<String, String>) {
    for (k, v) in map {
        field(hasher, &format!("{}/{}", key, k), v);
    }
}
