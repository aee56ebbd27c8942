//! Reserved CPU and memory accounting for an instance type, mirroring what
//! the node's kubelet will hold back before the scheduler sees allocatable
//! capacity.
//!
//! Pod capacity drives memory reservation: an explicit max-pods wins,
//! otherwise density is limited by the instance's network interfaces, with a
//! pods-per-core setting capping either.  Reservations from the kubelet
//! configuration override the computed values.

use launch_options::quantity::{parse_cpu_millis, ByteQuantity};
use launch_options::{InstanceTypeInfo, KubeletConfiguration};
use snafu::{OptionExt, ResultExt};

const MIB: u64 = 1 << 20;

/// Flat memory reservation plus a per-pod increment, in MiB.
const BASE_RESERVED_MEMORY_MIB: u64 = 255;
const PER_POD_RESERVED_MEMORY_MIB: u64 = 11;

/// Default `memory.available` eviction threshold when none is configured.
const DEFAULT_EVICTION_MEMORY_MIB: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceOverhead {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
    pub pod_capacity: u32,
    /// True when pod capacity came from interface limits rather than an
    /// explicit max-pods; the shell bootstrap family needs to know.
    pub eni_limited_pod_density: bool,
}

pub fn compute(
    instance_type: &InstanceTypeInfo,
    kubelet: &KubeletConfiguration,
    vm_memory_overhead_percent: f64,
) -> Result<ResourceOverhead> {
    let eni_limited_pod_density = kubelet.max_pods.is_none();
    let mut pod_capacity = kubelet
        .max_pods
        .unwrap_or_else(|| instance_type.eni_limited_pods());
    if let Some(pods_per_core) = kubelet.pods_per_core {
        pod_capacity = pod_capacity.min(pods_per_core * instance_type.vcpus);
    }

    let reserved_memory = match kubelet.kube_reserved.get("memory") {
        Some(quantity) => quantity
            .parse::<ByteQuantity>()
            .context(error::ParseQuantitySnafu { key: "memory" })?
            .bytes(),
        None => (BASE_RESERVED_MEMORY_MIB + PER_POD_RESERVED_MEMORY_MIB * pod_capacity as u64)
            * MIB,
    };

    let reserved_cpu = match kubelet.kube_reserved.get("cpu") {
        Some(quantity) => parse_cpu_millis(quantity).context(error::ParseCpuSnafu)?,
        None => reserved_cpu_millis(instance_type.vcpus),
    };

    let memory_capacity = instance_type.memory_mib * MIB;
    let eviction = eviction_threshold(kubelet, memory_capacity)?;
    let vm_overhead = (memory_capacity as f64 * vm_memory_overhead_percent).ceil() as u64;

    Ok(ResourceOverhead {
        cpu_millis: reserved_cpu,
        memory_bytes: reserved_memory + eviction + vm_overhead,
        pod_capacity,
        eni_limited_pod_density,
    })
}

/// Graduated reservation schedule: 6% of the first core, 1% of the second,
/// 0.5% of the third and fourth, 0.25% of every core beyond.  Computed in
/// micro-cores so the quarter-percent steps stay exact, rounded up to whole
/// millicores at the end.
fn reserved_cpu_millis(vcpus: u32) -> u64 {
    let mut micro: u64 = 0;
    for core in 1..=vcpus as u64 {
        micro += match core {
            1 => 60_000,
            2 => 10_000,
            3 | 4 => 5_000,
            _ => 2_500,
        };
    }
    (micro + 999) / 1000
}

/// The `memory.available` eviction signal, as an absolute quantity or a
/// percentage of memory capacity.  The hard and soft thresholds are both
/// consulted and the larger reservation wins.
fn eviction_threshold(kubelet: &KubeletConfiguration, memory_capacity: u64) -> Result<u64> {
    let mut threshold = None;
    for map in [&kubelet.eviction_hard, &kubelet.eviction_soft] {
        if let Some(value) = map.get("memory.available") {
            let bytes = parse_threshold(value, memory_capacity)?;
            threshold = Some(threshold.map_or(bytes, |current: u64| current.max(bytes)));
        }
    }
    Ok(threshold.unwrap_or(DEFAULT_EVICTION_MEMORY_MIB * MIB))
}

fn parse_threshold(value: &str, memory_capacity: u64) -> Result<u64> {
    if let Some(percent) = value.strip_suffix('%') {
        let percent: f64 = percent
            .trim()
            .parse()
            .ok()
            .filter(|p| (0.0..=100.0).contains(p))
            .context(error::ParsePercentSnafu { value })?;
        // Integer arithmetic in hundredths of a percent; the division
        // floors, matching capacity * percent / 100 over whole bytes.
        let scaled = (percent * 100.0).round() as u128;
        return Ok((memory_capacity as u128 * scaled / 10_000) as u64);
    }
    Ok(value
        .parse::<ByteQuantity>()
        .context(error::ParseQuantitySnafu {
            key: "memory.available",
        })?
        .bytes())
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Invalid quantity for '{}': {}", key, source))]
        ParseQuantity {
            key: String,
            source: launch_options::quantity::Error,
        },

        #[snafu(display("Invalid CPU quantity: {}", source))]
        ParseCpu {
            source: launch_options::quantity::Error,
        },

        #[snafu(display("Invalid percentage threshold '{}'", value))]
        ParsePercent { value: String },
    }
}

pub use error::Error;
type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod test {
    use super::{compute, MIB};
    use launch_options::{Architecture, InstanceTypeInfo, KubeletConfiguration};
    use maplit::btreemap;

    fn m5_xlarge() -> InstanceTypeInfo {
        InstanceTypeInfo {
            instance_type: "m5.xlarge".to_string(),
            architecture: Architecture::Amd64,
            vcpus: 4,
            memory_mib: 16384,
            eni_count: 4,
            ipv4_per_eni: 15,
        }
    }

    #[test]
    fn eni_limited_density_drives_memory_reservation() {
        let overhead = compute(&m5_xlarge(), &KubeletConfiguration::default(), 0.0).unwrap();
        // 4 ENIs x 14 addresses + 2 = 58 pods.
        assert_eq!(overhead.pod_capacity, 58);
        assert!(overhead.eni_limited_pod_density);
        // 255Mi base + 11Mi x 58 pods + 100Mi default eviction threshold.
        assert_eq!(overhead.memory_bytes, 993 * MIB);
    }

    #[test]
    fn explicit_max_pods_drives_memory_reservation() {
        let kubelet = KubeletConfiguration {
            max_pods: Some(110),
            ..Default::default()
        };
        let overhead = compute(&m5_xlarge(), &kubelet, 0.0).unwrap();
        assert_eq!(overhead.pod_capacity, 110);
        assert!(!overhead.eni_limited_pod_density);
        assert_eq!(overhead.memory_bytes, 1565 * MIB);
    }

    #[test]
    fn pods_per_core_caps_density() {
        let kubelet = KubeletConfiguration {
            pods_per_core: Some(10),
            ..Default::default()
        };
        let overhead = compute(&m5_xlarge(), &kubelet, 0.0).unwrap();
        // min(10 x 4 cores, 58 ENI-limited).
        assert_eq!(overhead.pod_capacity, 40);
    }

    #[test]
    fn graduated_cpu_schedule() {
        let overhead = compute(&m5_xlarge(), &KubeletConfiguration::default(), 0.0).unwrap();
        // 60 + 10 + 5 + 5.
        assert_eq!(overhead.cpu_millis, 80);

        let mut big = m5_xlarge();
        big.vcpus = 8;
        let overhead = compute(&big, &KubeletConfiguration::default(), 0.0).unwrap();
        // 80 + 2.5 x 4.
        assert_eq!(overhead.cpu_millis, 90);
    }

    #[test]
    fn kube_reserved_overrides_win() {
        let kubelet = KubeletConfiguration {
            kube_reserved: btreemap! {
                "cpu".to_string() => "500m".to_string(),
                "memory".to_string() => "1Gi".to_string(),
            },
            ..Default::default()
        };
        let overhead = compute(&m5_xlarge(), &kubelet, 0.0).unwrap();
        assert_eq!(overhead.cpu_millis, 500);
        // 1Gi reserved + 100Mi default eviction.
        assert_eq!(overhead.memory_bytes, 1124 * MIB);
    }

    #[test]
    fn percent_eviction_threshold() {
        let kubelet = KubeletConfiguration {
            eviction_hard: btreemap! {
                "memory.available".to_string() => "5%".to_string(),
            },
            ..Default::default()
        };
        let overhead = compute(&m5_xlarge(), &kubelet, 0.0).unwrap();
        // 255 + 11 x 58 = 893Mi reserved, plus 5% of 16384Mi.
        let expected = 893 * MIB + (16384 * MIB) / 20;
        assert_eq!(overhead.memory_bytes, expected);
    }

    #[test]
    fn fractional_percent_eviction_threshold() {
        let kubelet = KubeletConfiguration {
            eviction_hard: btreemap! {
                "memory.available".to_string() => "2.5%".to_string(),
            },
            ..Default::default()
        };
        let overhead = compute(&m5_xlarge(), &kubelet, 0.0).unwrap();
        let expected = 893 * MIB + ((16384 * MIB) as u128 * 250 / 10_000) as u64;
        assert_eq!(overhead.memory_bytes, expected);
    }

    #[test]
    fn vm_overhead_percent_adds_on_top() {
        let none = compute(&m5_xlarge(), &KubeletConfiguration::default(), 0.0).unwrap();
        let some = compute(&m5_xlarge(), &KubeletConfiguration::default(), 0.075).unwrap();
        let capacity = 16384 * MIB;
        assert_eq!(
            some.memory_bytes - none.memory_bytes,
            (capacity as f64 * 0.075).ceil() as u64
        );
    }

    #[test]
    fn invalid_quantities_are_rejected() {
        let kubelet = KubeletConfiguration {
            eviction_hard: btreemap! {
                "memory.available".to_string() => "lots".to_string(),
            },
            ..Default::default()
        };
        assert!(compute(&m5_xlarge(), &kubelet, 0.0).is_err());
    }
}
