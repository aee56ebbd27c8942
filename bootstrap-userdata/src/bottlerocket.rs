//! TOML-dialect bootstrap: cluster and kubelet settings are expressed as a
//! settings tree and deep-merged over whatever settings the operator already
//! supplied as custom data. Generated values win on conflict so the node
//! always joins the cluster it was launched for.

use crate::error::{self, Result};
use crate::{flags, merge, BootstrapOptions};
use snafu::{ensure, ResultExt};
use toml::{Table, Value};

pub(crate) fn render(options: &BootstrapOptions) -> Result<String> {
    let mut document = match &options.custom_user_data {
        Some(data) => {
            let value: Value = data.parse().context(error::UserDataTomlSnafu)?;
            ensure!(value.is_table(), error::UserDataNotTableSnafu);
            value
        }
        None => Value::Table(Table::new()),
    };

    let generated = settings(options);
    merge::merge_values(&mut document, &generated).context(error::MergeSettingsSnafu)?;

    toml::to_string(&document).context(error::SerializeSettingsSnafu)
}

fn settings(options: &BootstrapOptions) -> Value {
    let mut kubernetes = Table::new();
    kubernetes.insert(
        "cluster-name".to_string(),
        Value::String(options.cluster_name.clone()),
    );
    kubernetes.insert(
        "api-server".to_string(),
        Value::String(options.cluster_endpoint.clone()),
    );
    if let Some(ca_bundle) = &options.ca_bundle {
        kubernetes.insert(
            "cluster-certificate".to_string(),
            Value::String(ca_bundle.clone()),
        );
    }
    if let Some(dns_ip) = options.cluster_dns_ip {
        kubernetes.insert(
            "cluster-dns-ip".to_string(),
            Value::String(dns_ip.to_string()),
        );
    }

    let kubelet = &options.kubelet;
    if let Some(max_pods) = kubelet.max_pods {
        kubernetes.insert("max-pods".to_string(), Value::Integer(max_pods.into()));
    }
    for (key, map) in [
        ("system-reserved", &kubelet.system_reserved),
        ("kube-reserved", &kubelet.kube_reserved),
        ("eviction-hard", &kubelet.eviction_hard),
    ] {
        if !map.is_empty() {
            let table: Table = map
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            kubernetes.insert(key.to_string(), Value::Table(table));
        }
    }
    // These two are strings on the settings side, not integers.
    if let Some(percent) = kubelet.image_gc_high_threshold_percent {
        kubernetes.insert(
            "image-gc-high-threshold-percent".to_string(),
            Value::String(percent.to_string()),
        );
    }
    if let Some(percent) = kubelet.image_gc_low_threshold_percent {
        kubernetes.insert(
            "image-gc-low-threshold-percent".to_string(),
            Value::String(percent.to_string()),
        );
    }
    if let Some(enabled) = kubelet.cpu_cfs_quota {
        kubernetes.insert("cpu-cfs-quota".to_string(), Value::Boolean(enabled));
    }

    if !options.labels.is_empty() {
        let labels: Table = options
            .labels
            .iter()
            .filter(|(key, _)| !flags::is_restricted_label(key))
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if !labels.is_empty() {
            kubernetes.insert("node-labels".to_string(), Value::Table(labels));
        }
    }
    if !options.taints.is_empty() {
        let mut taints = Table::new();
        for taint in &options.taints {
            let rendered = format!(
                "{}:{}",
                taint.value.as_deref().unwrap_or_default(),
                taint.effect
            );
            if let Some(values) = taints
                .entry(taint.key.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
            {
                values.push(Value::String(rendered));
            }
        }
        kubernetes.insert("node-taints".to_string(), Value::Table(taints));
    }

    let mut settings = Table::new();
    settings.insert("kubernetes".to_string(), Value::Table(kubernetes));
    let mut root = Table::new();
    root.insert("settings".to_string(), Value::Table(settings));
    Value::Table(root)
}

#[cfg(test)]
mod test {
    use super::render;
    use crate::error::Error;
    use crate::BootstrapOptions;
    use launch_options::{KubeletConfiguration, Taint, TaintEffect};
    use maplit::btreemap;
    use toml::Value;

    fn options() -> BootstrapOptions {
        BootstrapOptions {
            cluster_name: "test-cluster".to_string(),
            cluster_endpoint: "https://test-cluster".to_string(),
            ca_bundle: Some("Y2EtYnVuZGxlCg==".to_string()),
            ..Default::default()
        }
    }

    fn parse(rendered: &str) -> Value {
        rendered.parse().unwrap()
    }

    fn kubernetes(value: &Value) -> &Value {
        &value["settings"]["kubernetes"]
    }

    #[test]
    fn cluster_settings_are_present() {
        let rendered = render(&options()).unwrap();
        let value = parse(&rendered);
        let kubernetes = kubernetes(&value);
        assert_eq!(
            kubernetes["cluster-name"].as_str().unwrap(),
            "test-cluster"
        );
        assert_eq!(
            kubernetes["api-server"].as_str().unwrap(),
            "https://test-cluster"
        );
        assert_eq!(
            kubernetes["cluster-certificate"].as_str().unwrap(),
            "Y2EtYnVuZGxlCg=="
        );
    }

    #[test]
    fn operator_settings_survive_the_merge() {
        let mut options = options();
        options.custom_user_data = Some(
            "[settings.kubernetes]\n\
             cluster-name = \"stale-cluster\"\n\
             \n\
             [settings.host-containers.admin]\n\
             enabled = true\n"
                .to_string(),
        );
        let rendered = render(&options).unwrap();
        let value = parse(&rendered);
        // Generated value wins on conflict, unrelated sections survive.
        assert_eq!(
            kubernetes(&value)["cluster-name"].as_str().unwrap(),
            "test-cluster"
        );
        assert!(value["settings"]["host-containers"]["admin"]["enabled"]
            .as_bool()
            .unwrap());
    }

    #[test]
    fn invalid_custom_user_data_is_rejected() {
        let mut options = options();
        options.custom_user_data = Some("not valid = toml [".to_string());
        assert!(matches!(
            render(&options).unwrap_err(),
            Error::UserDataToml { .. }
        ));
    }

    #[test]
    fn kubelet_settings_use_kebab_keys() {
        let mut options = options();
        options.kubelet = KubeletConfiguration {
            max_pods: Some(110),
            system_reserved: btreemap! {
                "cpu".to_string() => "250m".to_string(),
                "ephemeral-storage".to_string() => "1Gi".to_string(),
                "memory".to_string() => "500Mi".to_string(),
            },
            eviction_hard: btreemap! {
                "memory.available".to_string() => "10%".to_string(),
            },
            image_gc_high_threshold_percent: Some(85),
            cpu_cfs_quota: Some(false),
            ..Default::default()
        };
        let rendered = render(&options).unwrap();
        let value = parse(&rendered);
        let kubernetes = kubernetes(&value);
        assert_eq!(kubernetes["max-pods"].as_integer().unwrap(), 110);
        let system_reserved = kubernetes["system-reserved"].as_table().unwrap();
        assert_eq!(system_reserved.len(), 3);
        assert_eq!(system_reserved["cpu"].as_str().unwrap(), "250m");
        assert_eq!(
            system_reserved["ephemeral-storage"].as_str().unwrap(),
            "1Gi"
        );
        assert_eq!(system_reserved["memory"].as_str().unwrap(), "500Mi");
        assert_eq!(
            kubernetes["eviction-hard"]["memory.available"]
                .as_str()
                .unwrap(),
            "10%"
        );
        // Threshold percentages are strings in this dialect.
        assert_eq!(
            kubernetes["image-gc-high-threshold-percent"]
                .as_str()
                .unwrap(),
            "85"
        );
        assert!(!kubernetes["cpu-cfs-quota"].as_bool().unwrap());
    }

    #[test]
    fn taints_group_by_key_and_labels_filter_restricted() {
        let mut options = options();
        options.taints = vec![
            Taint::new("dedicated", "gpu", TaintEffect::NoSchedule),
            Taint::new("dedicated", "infra", TaintEffect::NoExecute),
            Taint {
                key: "maintenance".to_string(),
                value: None,
                effect: TaintEffect::NoSchedule,
            },
        ];
        options.labels = btreemap! {
            "team".to_string() => "data".to_string(),
            "node-restriction.kubernetes.io/forbidden".to_string() => "x".to_string(),
        };
        let rendered = render(&options).unwrap();
        let value = parse(&rendered);
        let kubernetes = kubernetes(&value);
        let dedicated = kubernetes["node-taints"]["dedicated"].as_array().unwrap();
        assert_eq!(dedicated.len(), 2);
        assert_eq!(dedicated[0].as_str().unwrap(), "gpu:NoSchedule");
        assert_eq!(dedicated[1].as_str().unwrap(), "infra:NoExecute");
        assert_eq!(
            kubernetes["node-taints"]["maintenance"].as_array().unwrap()[0]
                .as_str()
                .unwrap(),
            ":NoSchedule"
        );
        assert_eq!(kubernetes["node-labels"]["team"].as_str().unwrap(), "data");
        assert!(kubernetes["node-labels"]
            .get("node-restriction.kubernetes.io/forbidden")
            .is_none());
    }
}
