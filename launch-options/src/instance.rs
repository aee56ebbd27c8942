//! Instance type hardware facts, as returned by the remote compute API's
//! instance type description.  Used for image compatibility checks and
//! reserved-capacity overhead accounting.

use serde::{Deserialize, Serialize};

/// The well-known requirement key instance types answer with their CPU
/// architecture.
pub const ARCHITECTURE_KEY: &str = "kubernetes.io/arch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[serde(rename = "amd64", alias = "x86_64")]
    Amd64,
    Arm64,
}

serde_plain::derive_display_from_serialize!(Architecture);
serde_plain::derive_fromstr_from_deserialize!(Architecture);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceTypeInfo {
    pub instance_type: String,
    pub architecture: Architecture,
    pub vcpus: u32,
    pub memory_mib: u64,
    /// Maximum attachable network interfaces.
    pub eni_count: u32,
    /// Private IPv4 addresses each interface supports.
    pub ipv4_per_eni: u32,
}

impl InstanceTypeInfo {
    /// Pod capacity when density is limited by attachable network interfaces:
    /// every interface past the first address hosts a pod, plus two for
    /// host-network pods.
    pub fn eni_limited_pods(&self) -> u32 {
        self.eni_count * (self.ipv4_per_eni.saturating_sub(1)) + 2
    }

    /// The value this instance type offers for a compatibility requirement
    /// key, if it knows the key at all.
    pub fn requirement_value(&self, key: &str) -> Option<String> {
        match key {
            ARCHITECTURE_KEY => Some(self.architecture.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Architecture, InstanceTypeInfo};

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
    fn eni_limited_pods() {
        assert_eq!(m5_xlarge().eni_limited_pods(), 58);
    }

    #[test]
    fn architecture_requirement() {
        assert_eq!(
            m5_xlarge().requirement_value("kubernetes.io/arch").unwrap(),
            "amd64"
        );
        assert!(m5_xlarge().requirement_value("unknown").is_none());
    }
}
