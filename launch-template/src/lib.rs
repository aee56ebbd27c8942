/*!
# Introduction

launch-template turns a resolved node request into a concrete, cached remote
launch template: a deterministic name over the cache-relevant configuration,
an expiring name-to-resource cache, image resolution by compatibility,
block device and overhead calculators, and the provider that assembles it
all against the remote compute API.

The boot payload itself is rendered by the `bootstrap-userdata` crate; the
value types come from `launch-options`.
*/

pub mod ami;
pub mod cache;
pub mod name;
pub mod overhead;
pub mod provider;
pub mod storage;

pub use ami::{Ami, AmiAssignment, Requirement, Resolution};
pub use cache::LaunchTemplateCache;
pub use name::{launch_template_name, LaunchSpec};
pub use overhead::ResourceOverhead;
pub use provider::{
    ApiError, ClusterCidrCell, Ec2Api, LaunchRequest, LaunchTarget, LaunchTemplate,
    LaunchTemplateProvider,
};
pub use storage::{block_device_mappings, BlockDeviceMapping};
