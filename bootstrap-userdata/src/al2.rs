//! Shell/cloud-init bootstrap: a script invoking the image's bootstrap agent
//! with computed flags, always shipped inside a multipart archive so custom
//! user data can ride along.

use crate::error::{self, Result};
use crate::mime::{self, Part};
use crate::{flags, BootstrapOptions};
use launch_options::InstanceStorePolicy;
use snafu::ResultExt;

pub(crate) fn render(options: &BootstrapOptions) -> Result<String> {
    let script = bootstrap_script(options);
    mime::merge(
        options.custom_user_data.as_deref(),
        mime::SHELL_SCRIPT,
        vec![Part::new(mime::SHELL_SCRIPT, script)],
    )
    .context(error::ParseUserDataSnafu)
}

fn bootstrap_script(options: &BootstrapOptions) -> String {
    let mut script = String::from("#!/bin/bash -xe\n");
    script.push_str("exec > >(tee /var/log/user-data.log|logger -t user-data -s 2>/dev/console) 2>&1\n");
    script.push_str(&format!("/etc/eks/bootstrap.sh '{}'", options.cluster_name));

    if !options.cluster_endpoint.is_empty() {
        script.push_str(&format!(
            " \\\n--apiserver-endpoint '{}'",
            options.cluster_endpoint
        ));
    }
    if let Some(ca_bundle) = &options.ca_bundle {
        script.push_str(&format!(" \\\n--b64-cluster-ca '{}'", ca_bundle));
    }
    // The agent's own max-pods table is wrong whenever density was computed
    // from interface limits or pinned by the user; disable it in both cases.
    if options.eni_limited_pod_density || options.kubelet.max_pods.is_some() {
        script.push_str(" \\\n--use-max-pods false");
    }
    if let Some(dns_ip) = options.cluster_dns_ip {
        script.push_str(&format!(" \\\n--dns-cluster-ip '{}'", dns_ip));
        if dns_ip.is_ipv6() {
            script.push_str(" \\\n--ip-family ipv6");
        }
    }
    if let Some(InstanceStorePolicy::Raid0) = options.instance_store_policy {
        script.push_str(" \\\n--local-disks raid0");
    }
    let kubelet_args = flags::kubelet_extra_args(&options.kubelet, &options.taints, &options.labels);
    if !kubelet_args.is_empty() {
        script.push_str(&format!(
            " \\\n--kubelet-extra-args '{}'",
            kubelet_args.join(" ")
        ));
    }
    script.push('\n');
    script
}
