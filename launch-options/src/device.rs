//! Block device declarations from node-class configuration.  These are the
//! caller's requested mappings; per-family defaulting and GiB conversion
//! happen in the launch-template crate.

use crate::quantity::ByteQuantity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockDeviceSpec {
    pub device_name: String,
    #[serde(default)]
    pub ebs: EbsSpec,
    /// Marks the volume the image boots from.  At most one mapping may set
    /// this; when none does, the first declared device is treated as root.
    #[serde(default)]
    pub root_volume: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EbsSpec {
    pub volume_size: Option<ByteQuantity>,
    pub volume_type: Option<String>,
    pub iops: Option<i64>,
    pub throughput: Option<i64>,
    pub encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub delete_on_termination: Option<bool>,
    pub snapshot_id: Option<String>,
}
