/*!
bootstrap-userdata renders the boot payload a freshly launched instance
consumes to join a cluster, in whichever dialect the instance's OS family
speaks.

Shell families get a bootstrap script, declarative families get a structured
node configuration document, the TOML family gets merged settings, and the
passthrough family hands operator data through untouched. Where a family's
agent supports multipart archives, operator-supplied custom data is carried
as the leading parts of the archive and generated parts are appended after it.
*/

use launch_options::{InstanceStorePolicy, KubeletConfiguration, Taint};
use std::collections::BTreeMap;
use std::net::IpAddr;

mod al2;
mod al2023;
mod bottlerocket;
pub mod flags;
pub mod merge;
pub mod mime;
mod windows;

pub use launch_options::OsFamily;

/// Everything a renderer may need to describe the cluster and the node's
/// kubelet to the boot agent. Renderers ignore the fields their dialect has
/// no use for.
#[derive(Debug, Default, Clone)]
pub struct BootstrapOptions {
    pub cluster_name: String,
    pub cluster_endpoint: String,
    /// Service CIDR, required by the declarative family only.
    pub cluster_cidr: Option<String>,
    /// Base64-encoded cluster certificate authority.
    pub ca_bundle: Option<String>,
    pub cluster_dns_ip: Option<IpAddr>,
    /// True when pod capacity was derived from network-interface limits
    /// rather than left to the image default.
    pub eni_limited_pod_density: bool,
    pub instance_store_policy: Option<InstanceStorePolicy>,
    pub kubelet: KubeletConfiguration,
    pub taints: Vec<Taint>,
    pub labels: BTreeMap<String, String>,
    pub custom_user_data: Option<String>,
}

/// A bootstrap renderer bound to an OS family.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    family: OsFamily,
    options: BootstrapOptions,
}

impl Bootstrapper {
    pub fn new(family: OsFamily, options: BootstrapOptions) -> Self {
        Self { family, options }
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Render the boot payload as plain text, custom data already merged in.
    pub fn render(&self) -> Result<String> {
        match self.family {
            OsFamily::Al2 => al2::render(&self.options),
            OsFamily::Al2023 => al2023::render(&self.options),
            OsFamily::Bottlerocket => bottlerocket::render(&self.options),
            OsFamily::Windows => Ok(windows::render(&self.options)),
            OsFamily::Custom => Ok(self
                .options
                .custom_user_data
                .clone()
                .unwrap_or_default()),
        }
    }
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display(
            "Cluster service CIDR is not resolved yet, cannot render node configuration"
        ))]
        ClusterCidrUnresolved,

        #[snafu(display("Cluster CA bundle is not valid base64: {}", source))]
        DecodeCaBundle { source: base64::DecodeError },

        #[snafu(display("Decoded cluster CA bundle is not UTF-8: {}", source))]
        CaBundleUtf8 { source: std::string::FromUtf8Error },

        #[snafu(display("Unable to parse custom user data: {}", source))]
        ParseUserData { source: crate::mime::Error },

        #[snafu(display("Custom user data is not valid TOML: {}", source))]
        UserDataToml { source: toml::de::Error },

        #[snafu(display("Custom user data TOML must be a table at the top level"))]
        UserDataNotTable,

        #[snafu(display("Unable to merge settings into custom user data: {}", source))]
        MergeSettings { source: crate::merge::Error },

        #[snafu(display("Unable to serialize settings: {}", source))]
        SerializeSettings { source: toml::ser::Error },

        #[snafu(display("Unable to serialize node configuration: {}", source))]
        SerializeNodeConfig { source: serde_yaml::Error },
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

pub use error::{Error, Result};
