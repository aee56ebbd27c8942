//! The options model: every resolved input that can influence a launch
//! template, gathered from cluster discovery and node-class configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// OS families we know how to bootstrap.  `Custom` opts out of generation
/// entirely; user data is passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    #[serde(rename = "AL2")]
    Al2,
    #[serde(rename = "AL2023")]
    Al2023,
    Bottlerocket,
    Windows,
    Custom,
}

serde_plain::derive_display_from_serialize!(OsFamily);
serde_plain::derive_fromstr_from_deserialize!(OsFamily);

/// What to do with ephemeral instance-store disks, when the instance type has
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStorePolicy {
    Raid0,
}

serde_plain::derive_display_from_serialize!(InstanceStorePolicy);
serde_plain::derive_fromstr_from_deserialize!(InstanceStorePolicy);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

impl Default for CapacityType {
    fn default() -> Self {
        CapacityType::OnDemand
    }
}

serde_plain::derive_display_from_serialize!(CapacityType);

/// Resolved inputs for one launch template.
///
/// Tags, labels, the CA bundle, and the node-class name are carried here for
/// rendering and resource tagging but are defined as cache-irrelevant: two
/// options values differing only in those fields share a fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Options {
    pub cluster_name: String,
    pub cluster_endpoint: String,
    /// Pod CIDR of the cluster, when discovery has resolved it.
    pub cluster_cidr: Option<String>,
    /// Base64 PEM bundle for the cluster CA.
    pub ca_bundle: Option<String>,
    pub kube_dns_ip: Option<IpAddr>,
    pub instance_store_policy: Option<InstanceStorePolicy>,
    /// Security group ids in the order they were configured; order is
    /// significant for fingerprinting.
    pub security_group_ids: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub associate_public_ip_address: Option<bool>,
    pub instance_profile: String,
    pub node_class_name: String,
}
