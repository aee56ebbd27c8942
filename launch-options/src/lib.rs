/*!
# Introduction

launch-options holds the value types that feed launch template generation: the
options model resolved from node-class configuration, kubelet tuning, taints,
block device declarations, and the instance type facts used for image
compatibility and overhead accounting.

Everything in this crate is pure data.  Rendering, fingerprinting, caching,
and remote calls live in the `bootstrap-userdata` and `launch-template`
crates.
*/

pub mod device;
pub mod instance;
pub mod kubelet;
pub mod options;
pub mod quantity;

pub use device::{BlockDeviceSpec, EbsSpec};
pub use instance::{Architecture, InstanceTypeInfo};
pub use kubelet::{KubeletConfiguration, Taint, TaintEffect};
pub use options::{CapacityType, InstanceStorePolicy, Options, OsFamily};
pub use quantity::ByteQuantity;
