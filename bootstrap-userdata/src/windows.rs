//! Windows bootstrap: a PowerShell payload invoking the platform bootstrap
//! script.  Custom user data is spliced into the same script block ahead of
//! the generated call, the platform's equivalent of the shell family's
//! multipart merge.

use crate::{flags, BootstrapOptions};

pub(crate) fn render(options: &BootstrapOptions) -> String {
    let mut script = String::from("<powershell>\n");
    if let Some(custom) = options
        .custom_user_data
        .as_deref()
        .filter(|data| !data.trim().is_empty())
    {
        script.push_str(custom.trim_end_matches('\n'));
        script.push('\n');
    }
    script.push_str(
        "[string]$EKSBootstrapScriptFile = \"$env:ProgramFiles\\Amazon\\EKS\\Start-EKSBootstrap.ps1\"\n",
    );
    script.push_str(&format!(
        "& $EKSBootstrapScriptFile -EKSClusterName '{}' -APIServerEndpoint '{}'",
        options.cluster_name, options.cluster_endpoint
    ));
    if let Some(ca_bundle) = &options.ca_bundle {
        script.push_str(&format!(" -Base64ClusterCA '{}'", ca_bundle));
    }
    if let Some(dns_ip) = options.cluster_dns_ip {
        script.push_str(&format!(" -DNSClusterIP '{}'", dns_ip));
    }
    let kubelet_args = flags::kubelet_extra_args(&options.kubelet, &options.taints, &options.labels);
    if !kubelet_args.is_empty() {
        script.push_str(&format!(" -KubeletExtraArgs '{}'", kubelet_args.join(" ")));
    }
    script.push_str(" 3>&1 4>&1 5>&1 6>&1\n</powershell>\n");
    script
}
