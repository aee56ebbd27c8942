//! Declarative-document bootstrap: a structured node configuration document
//! consumed by the image's nodeadm agent, wrapped as its own part in a
//! multipart archive.
//!
//! Unlike the shell family, networking here is not discovered on the node:
//! rendering requires an already-resolved cluster CIDR and fails loudly
//! without one.

use crate::error::{self, Result};
use crate::mime::{self, Part};
use crate::{flags, BootstrapOptions};
use base64::Engine;
use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;

const API_VERSION: &str = "node.eks.aws/v1alpha1";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeConfig {
    api_version: &'static str,
    kind: &'static str,
    spec: NodeConfigSpec,
}

#[derive(Serialize)]
struct NodeConfigSpec {
    cluster: ClusterSpec,
    kubelet: KubeletSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSpec {
    name: String,
    api_server_endpoint: String,
    certificate_authority: String,
    cidr: String,
}

#[derive(Serialize)]
struct KubeletSpec {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    config: BTreeMap<&'static str, serde_yaml::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    flags: Vec<String>,
}

pub(crate) fn render(options: &BootstrapOptions) -> Result<String> {
    let node_config = node_config(options)?;
    let document = format!(
        "---\n{}",
        serde_yaml::to_string(&node_config).context(error::SerializeNodeConfigSnafu)?
    );

    let fallback = options
        .custom_user_data
        .as_deref()
        .map(infer_part_type)
        .unwrap_or(mime::SHELL_SCRIPT);
    mime::merge(
        options.custom_user_data.as_deref(),
        fallback,
        vec![Part::new(mime::NODE_CONFIG, document)],
    )
    .context(error::ParseUserDataSnafu)
}

/// Single-part custom data may be a bare node configuration document or a
/// plain script; pick the part type accordingly.
fn infer_part_type(data: &str) -> &'static str {
    if data.contains("node.eks.aws") && data.contains("kind: NodeConfig") {
        mime::NODE_CONFIG
    } else {
        mime::SHELL_SCRIPT
    }
}

fn node_config(options: &BootstrapOptions) -> Result<NodeConfig> {
    let cidr = options
        .cluster_cidr
        .clone()
        .context(error::ClusterCidrUnresolvedSnafu)?;

    // nodeadm wants the decoded PEM, not the base64 the API hands around.
    let certificate_authority = match &options.ca_bundle {
        Some(bundle) => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(bundle)
                .context(error::DecodeCaBundleSnafu)?;
            String::from_utf8(decoded).context(error::CaBundleUtf8Snafu)?
        }
        None => String::new(),
    };

    let mut config = BTreeMap::new();
    let kubelet = &options.kubelet;
    if let Some(max_pods) = kubelet.max_pods {
        config.insert("maxPods", serde_yaml::Value::from(max_pods));
    }
    if let Some(pods_per_core) = kubelet.pods_per_core {
        config.insert("podsPerCore", serde_yaml::Value::from(pods_per_core));
    }
    let cluster_dns: Vec<String> = if !kubelet.cluster_dns.is_empty() {
        kubelet.cluster_dns.clone()
    } else {
        options
            .cluster_dns_ip
            .map(|ip| vec![ip.to_string()])
            .unwrap_or_default()
    };
    if !cluster_dns.is_empty() {
        config.insert(
            "clusterDNS",
            serde_yaml::to_value(&cluster_dns).context(error::SerializeNodeConfigSnafu)?,
        );
    }
    for (key, map) in [
        ("systemReserved", &kubelet.system_reserved),
        ("kubeReserved", &kubelet.kube_reserved),
        ("evictionHard", &kubelet.eviction_hard),
        ("evictionSoft", &kubelet.eviction_soft),
        ("evictionSoftGracePeriod", &kubelet.eviction_soft_grace_period),
    ] {
        if !map.is_empty() {
            config.insert(
                key,
                serde_yaml::to_value(map).context(error::SerializeNodeConfigSnafu)?,
            );
        }
    }
    if let Some(period) = kubelet.eviction_max_pod_grace_period {
        config.insert("evictionMaxPodGracePeriod", serde_yaml::Value::from(period));
    }
    if let Some(percent) = kubelet.image_gc_high_threshold_percent {
        config.insert("imageGCHighThresholdPercent", serde_yaml::Value::from(percent));
    }
    if let Some(percent) = kubelet.image_gc_low_threshold_percent {
        config.insert("imageGCLowThresholdPercent", serde_yaml::Value::from(percent));
    }
    if let Some(enabled) = kubelet.cpu_cfs_quota {
        config.insert("cpuCFSQuota", serde_yaml::Value::from(enabled));
    }
    if !options.taints.is_empty() {
        config.insert(
            "registerWithTaints",
            serde_yaml::to_value(&options.taints).context(error::SerializeNodeConfigSnafu)?,
        );
    }

    let mut kubelet_flags = Vec::new();
    if let Some(labels) = flags::node_labels(&options.labels) {
        kubelet_flags.push(format!("--node-labels={}", labels));
    }

    Ok(NodeConfig {
        api_version: API_VERSION,
        kind: "NodeConfig",
        spec: NodeConfigSpec {
            cluster: ClusterSpec {
                name: options.cluster_name.clone(),
                api_server_endpoint: options.cluster_endpoint.clone(),
                certificate_authority,
                cidr,
            },
            kubelet: KubeletSpec {
                config,
                flags: kubelet_flags,
            },
        },
    })
}
