//! Block device layout for a launch template.
//!
//! Families get their documented defaults only when the configuration names
//! no devices at all; the Custom family never defaults.  Sizes convert to
//! whole gibibytes, rounding up.

use launch_options::{BlockDeviceSpec, OsFamily};

const DEFAULT_VOLUME_TYPE: &str = "gp3";
const DEFAULT_VOLUME_SIZE_GIB: u64 = 20;
const BOTTLEROCKET_CONTROL_SIZE_GIB: u64 = 4;

/// A device mapping in the shape the remote create call takes: sizes already
/// converted to whole gibibytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub volume_size_gib: Option<u64>,
    pub volume_type: Option<String>,
    pub iops: Option<i64>,
    pub throughput: Option<i64>,
    pub encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub delete_on_termination: Option<bool>,
    pub snapshot_id: Option<String>,
    pub root_volume: bool,
}

pub fn block_device_mappings(
    specs: &[BlockDeviceSpec],
    family: OsFamily,
) -> Vec<BlockDeviceMapping> {
    if specs.is_empty() {
        return default_mappings(family);
    }
    specs.iter().map(convert).collect()
}

fn convert(spec: &BlockDeviceSpec) -> BlockDeviceMapping {
    let ebs = &spec.ebs;
    BlockDeviceMapping {
        device_name: spec.device_name.clone(),
        volume_size_gib: ebs.volume_size.map(|size| size.gib_ceil()),
        volume_type: ebs.volume_type.clone(),
        iops: ebs.iops,
        throughput: ebs.throughput,
        encrypted: ebs.encrypted,
        kms_key_id: ebs.kms_key_id.clone(),
        delete_on_termination: ebs.delete_on_termination,
        snapshot_id: ebs.snapshot_id.clone(),
        root_volume: spec.root_volume,
    }
}

fn default_mappings(family: OsFamily) -> Vec<BlockDeviceMapping> {
    match family {
        OsFamily::Al2 | OsFamily::Al2023 | OsFamily::Windows => vec![default_volume(
            "/dev/xvda",
            DEFAULT_VOLUME_SIZE_GIB,
            true,
        )],
        // Bottlerocket images split the OS onto a small control volume; the
        // second volume holds orchestrated containers and is the one worth
        // sizing.
        OsFamily::Bottlerocket => vec![
            default_volume("/dev/xvda", BOTTLEROCKET_CONTROL_SIZE_GIB, false),
            default_volume("/dev/xvdb", DEFAULT_VOLUME_SIZE_GIB, true),
        ],
        OsFamily::Custom => Vec::new(),
    }
}

fn default_volume(device_name: &str, size_gib: u64, root_volume: bool) -> BlockDeviceMapping {
    BlockDeviceMapping {
        device_name: device_name.to_string(),
        volume_size_gib: Some(size_gib),
        volume_type: Some(DEFAULT_VOLUME_TYPE.to_string()),
        root_volume,
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::{block_device_mappings, BlockDeviceMapping};
    use launch_options::device::{BlockDeviceSpec, EbsSpec};
    use launch_options::{ByteQuantity, OsFamily};

    fn spec(size: &str) -> BlockDeviceSpec {
        BlockDeviceSpec {
            device_name: "/dev/xvda".to_string(),
            ebs: EbsSpec {
                volume_size: Some(size.parse::<ByteQuantity>().unwrap()),
                volume_type: Some("gp3".to_string()),
                ..Default::default()
            },
            root_volume: true,
        }
    }

    #[test]
    fn shell_families_default_to_one_root_volume() {
        for family in [OsFamily::Al2, OsFamily::Al2023, OsFamily::Windows] {
            let mappings = block_device_mappings(&[], family);
            assert_eq!(mappings.len(), 1, "{}", family);
            assert_eq!(mappings[0].device_name, "/dev/xvda");
            assert_eq!(mappings[0].volume_size_gib, Some(20));
            assert_eq!(mappings[0].volume_type.as_deref(), Some("gp3"));
            assert!(mappings[0].root_volume);
        }
    }

    #[test]
    fn bottlerocket_defaults_to_control_plus_user_volume() {
        let mappings = block_device_mappings(&[], OsFamily::Bottlerocket);
        assert_eq!(
            mappings
                .iter()
                .map(|m| (m.device_name.as_str(), m.volume_size_gib, m.root_volume))
                .collect::<Vec<_>>(),
            vec![
                ("/dev/xvda", Some(4), false),
                ("/dev/xvdb", Some(20), true),
            ]
        );
    }

    #[test]
    fn custom_family_never_defaults() {
        assert!(block_device_mappings(&[], OsFamily::Custom).is_empty());
    }

    #[test]
    fn explicit_specs_suppress_defaults() {
        let mappings = block_device_mappings(&[spec("40Gi")], OsFamily::Bottlerocket);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].volume_size_gib, Some(40));
    }

    #[test]
    fn sizes_round_up_to_whole_gibibytes() {
        let expectations = [("200G", 187), ("200Gi", 200), ("4G", 4), ("2G", 2)];
        for (input, expected) in expectations {
            let mappings = block_device_mappings(&[spec(input)], OsFamily::Al2);
            assert_eq!(mappings[0].volume_size_gib, Some(expected), "{}", input);
        }
    }

    #[test]
    fn spec_fields_carry_through() {
        let device = BlockDeviceSpec {
            device_name: "/dev/xvdb".to_string(),
            ebs: EbsSpec {
                volume_size: Some(ByteQuantity::from_gib(100)),
                volume_type: Some("io2".to_string()),
                iops: Some(10_000),
                throughput: Some(125),
                encrypted: Some(true),
                kms_key_id: Some("key-id".to_string()),
                delete_on_termination: Some(false),
                snapshot_id: Some("snap-123".to_string()),
            },
            root_volume: false,
        };
        let mappings = block_device_mappings(&[device], OsFamily::Al2);
        assert_eq!(
            mappings[0],
            BlockDeviceMapping {
                device_name: "/dev/xvdb".to_string(),
                volume_size_gib: Some(100),
                volume_type: Some("io2".to_string()),
                iops: Some(10_000),
                throughput: Some(125),
                encrypted: Some(true),
                kms_key_id: Some("key-id".to_string()),
                delete_on_termination: Some(false),
                snapshot_id: Some("snap-123".to_string()),
                root_volume: false,
            }
        );
    }
}
