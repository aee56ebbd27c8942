//! Assembles launch templates end to end: name the configuration, consult
//! the cache, render the boot payload, compute block devices, create the
//! remote resource, and submit fleets against it.
//!
//! The remote API is reached through the [`Ec2Api`] trait so tests can stand
//! in a fake.  Stale cache entries are handled by the recovery protocol: if
//! a fleet submission is rejected because a cached template no longer exists
//! remotely, the entries are invalidated and generation runs exactly once
//! more; a second rejection is fatal.

use crate::ami::{self, Ami};
use crate::cache::LaunchTemplateCache;
use crate::name::{launch_template_name, LaunchSpec};
use crate::storage::{block_device_mappings, BlockDeviceMapping};
use async_trait::async_trait;
use base64::Engine;
use bootstrap_userdata::{BootstrapOptions, Bootstrapper};
use chrono::{DateTime, Utc};
use launch_options::{
    Architecture, BlockDeviceSpec, CapacityType, InstanceTypeInfo, KubeletConfiguration, Options,
    OsFamily, Taint,
};
use log::{debug, info, warn};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Error code the compute API returns when a fleet references a launch
/// template that no longer exists.
const UNKNOWN_LAUNCH_TEMPLATE_CODE: &str = "InvalidLaunchTemplateName.NotFoundException";

/// A failure reported by the remote API, reduced to the code/message pair
/// every call shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_unknown_launch_template(&self) -> bool {
        self.code == UNKNOWN_LAUNCH_TEMPLATE_CODE
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateLaunchTemplateRequest {
    pub name: String,
    pub image_id: String,
    pub security_group_ids: Vec<String>,
    pub instance_profile: String,
    pub block_devices: Vec<BlockDeviceMapping>,
    /// Rendered boot payload, base64-encoded for transport.
    pub user_data: String,
    pub tags: BTreeMap<String, String>,
    pub associate_public_ip_address: Option<bool>,
    pub detailed_monitoring: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FleetTarget {
    pub launch_template_name: String,
    pub launch_template_id: String,
    pub instance_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateFleetRequest {
    pub targets: Vec<FleetTarget>,
    pub capacity_type: CapacityType,
    pub count: u32,
    pub tags: BTreeMap<String, String>,
}

/// One page of instance type facts from the paged describe call.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceTypePage {
    pub instance_types: Vec<InstanceTypeInfo>,
    pub next_token: Option<String>,
}

/// The remote compute and parameter-store surface this provider consumes.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn create_launch_template(
        &self,
        request: CreateLaunchTemplateRequest,
    ) -> ApiResult<String>;

    async fn create_fleet(&self, request: CreateFleetRequest) -> ApiResult<Vec<String>>;

    async fn describe_images(&self, image_ids: Vec<String>) -> ApiResult<Vec<Ami>>;

    async fn describe_instance_types(
        &self,
        next_token: Option<String>,
    ) -> ApiResult<InstanceTypePage>;

    /// Parameter-store lookup, used for recommended-image resolution.
    async fn get_parameter(&self, path: String) -> ApiResult<String>;
}

/// The cached entity: a created remote launch template.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchTemplate {
    pub name: String,
    pub id: String,
    pub image_id: String,
    pub block_devices: Vec<BlockDeviceMapping>,
    pub created_at: DateTime<Utc>,
}

/// A launch template paired with the instance types resolved to it for the
/// current request.  The pairing is per-request; only the template itself is
/// cached.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchTarget {
    pub template: LaunchTemplate,
    pub instance_types: Vec<String>,
}

/// One provisioning request, with every input already resolved by the
/// surrounding control loop.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub options: Options,
    pub family: OsFamily,
    pub kubelet: KubeletConfiguration,
    pub taints: Vec<Taint>,
    pub block_devices: Vec<BlockDeviceSpec>,
    pub capacity_type: CapacityType,
    pub custom_user_data: Option<String>,
    /// Explicit image candidates; when empty, the recommended image for the
    /// cluster version is looked up instead.
    pub image_candidates: Vec<Ami>,
    pub instance_types: Vec<InstanceTypeInfo>,
    pub cluster_version: String,
    pub detailed_monitoring: bool,
    pub count: u32,
}

/// Cluster pod CIDR, discovered once by a background writer and read by
/// every render.  Reads before the first commit return `None`; the
/// declarative bootstrap family treats that as configuration-incomplete.
#[derive(Debug, Clone, Default)]
pub struct ClusterCidrCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl ClusterCidrCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve<S: Into<String>>(&self, cidr: S) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = Some(cidr.into());
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().ok().and_then(|inner| inner.clone())
    }
}

pub struct LaunchTemplateProvider<C> {
    client: C,
    cache: LaunchTemplateCache<LaunchTemplate>,
    cluster_cidr: ClusterCidrCell,
}

impl<C: Ec2Api> LaunchTemplateProvider<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            cache: LaunchTemplateCache::default(),
            cluster_cidr: ClusterCidrCell::new(),
        }
    }

    pub fn with_cache_ttl(client: C, ttl: Duration) -> Self {
        Self {
            client,
            cache: LaunchTemplateCache::new(ttl),
            cluster_cidr: ClusterCidrCell::new(),
        }
    }

    pub fn cluster_cidr(&self) -> &ClusterCidrCell {
        &self.cluster_cidr
    }

    pub fn cache(&self) -> &LaunchTemplateCache<LaunchTemplate> {
        &self.cache
    }

    /// Resolves images for the request and makes sure a launch template
    /// exists remotely for each, creating and caching what is missing.
    ///
    /// An empty result means no instance type was compatible with any image;
    /// the caller decides whether that is unschedulable.
    pub async fn ensure_launch_templates(
        &self,
        request: &LaunchRequest,
    ) -> Result<Vec<LaunchTarget>> {
        let candidates = self.image_candidates(request).await?;
        let resolution = ami::resolve(&candidates, &request.instance_types);
        if !resolution.incompatible.is_empty() {
            warn!(
                "no compatible image for instance types: {}",
                resolution
                    .incompatible
                    .iter()
                    .map(|t| t.instance_type.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let mut targets = Vec::new();
        for assignment in resolution.assignments {
            let template = self.ensure_template(request, &assignment.ami).await?;
            targets.push(LaunchTarget {
                template,
                instance_types: assignment
                    .instance_types
                    .iter()
                    .map(|t| t.instance_type.clone())
                    .collect(),
            });
        }
        Ok(targets)
    }

    /// Submits a fleet for the request, driving the stale-cache recovery
    /// protocol: one invalidate-and-regenerate cycle on an unknown-template
    /// rejection, fatal on the second.
    pub async fn launch_instances(&self, request: &LaunchRequest) -> Result<Vec<String>> {
        let targets = self.ensure_launch_templates(request).await?;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        match self.submit(request, &targets).await {
            Ok(instance_ids) => Ok(instance_ids),
            Err(source) if source.is_unknown_launch_template() => {
                warn!("fleet rejected a cached launch template, regenerating: {source}");
                for target in &targets {
                    self.cache.invalidate(&target.template.name);
                }
                let targets = self.ensure_launch_templates(request).await?;
                self.submit(request, &targets)
                    .await
                    .context(error::CreateFleetSnafu)
            }
            Err(source) => Err(source).context(error::CreateFleetSnafu),
        }
    }

    /// Fetches the full instance type catalog, following pagination.
    pub async fn instance_type_catalog(&self) -> Result<Vec<InstanceTypeInfo>> {
        let mut catalog = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .client
                .describe_instance_types(next_token)
                .await
                .context(error::DescribeInstanceTypesSnafu)?;
            catalog.extend(page.instance_types);
            next_token = page.next_token;
            if next_token.is_none() {
                return Ok(catalog);
            }
        }
    }

    async fn submit(
        &self,
        request: &LaunchRequest,
        targets: &[LaunchTarget],
    ) -> ApiResult<Vec<String>> {
        self.client
            .create_fleet(CreateFleetRequest {
                targets: targets
                    .iter()
                    .map(|target| FleetTarget {
                        launch_template_name: target.template.name.clone(),
                        launch_template_id: target.template.id.clone(),
                        instance_types: target.instance_types.clone(),
                    })
                    .collect(),
                capacity_type: request.capacity_type,
                count: request.count,
                tags: request.options.tags.clone(),
            })
            .await
    }

    async fn ensure_template(
        &self,
        request: &LaunchRequest,
        image: &Ami,
    ) -> Result<LaunchTemplate> {
        // The fallback-resolved CIDR is part of the rendered payload, so it
        // is resolved once here and feeds both the name and the render.  A
        // re-resolved cell then produces a new name instead of a cache hit
        // on a template carrying the old value.
        let cluster_cidr = request
            .options
            .cluster_cidr
            .clone()
            .or_else(|| self.cluster_cidr.get());
        let name = launch_template_name(&LaunchSpec {
            options: &request.options,
            family: request.family,
            kubelet: &request.kubelet,
            taints: &request.taints,
            block_devices: &request.block_devices,
            capacity_type: request.capacity_type,
            custom_user_data: request.custom_user_data.as_deref(),
            image_id: &image.id,
            cluster_cidr: cluster_cidr.as_deref(),
        });
        if let Some(template) = self.cache.get(&name) {
            debug!("reusing cached launch template {name}");
            return Ok(template);
        }

        let user_data = self.render_user_data(request, cluster_cidr)?;
        let block_devices = block_device_mappings(&request.block_devices, request.family);
        let id = self
            .client
            .create_launch_template(CreateLaunchTemplateRequest {
                name: name.clone(),
                image_id: image.id.clone(),
                security_group_ids: request.options.security_group_ids.clone(),
                instance_profile: request.options.instance_profile.clone(),
                block_devices: block_devices.clone(),
                user_data: base64::engine::general_purpose::STANDARD.encode(user_data),
                tags: request.options.tags.clone(),
                associate_public_ip_address: request.options.associate_public_ip_address,
                detailed_monitoring: request.detailed_monitoring,
            })
            .await
            .context(error::CreateLaunchTemplateSnafu { name: name.clone() })?;
        info!("created launch template {name} ({id}) for image {}", image.id);

        let template = LaunchTemplate {
            name: name.clone(),
            id,
            image_id: image.id.clone(),
            block_devices,
            created_at: Utc::now(),
        };
        self.cache.put(&name, template.clone());
        Ok(template)
    }

    fn render_user_data(
        &self,
        request: &LaunchRequest,
        cluster_cidr: Option<String>,
    ) -> Result<String> {
        let options = &request.options;
        Bootstrapper::new(
            request.family,
            BootstrapOptions {
                cluster_name: options.cluster_name.clone(),
                cluster_endpoint: options.cluster_endpoint.clone(),
                cluster_cidr,
                ca_bundle: options.ca_bundle.clone(),
                cluster_dns_ip: options.kube_dns_ip,
                eni_limited_pod_density: request.kubelet.max_pods.is_none(),
                instance_store_policy: options.instance_store_policy,
                kubelet: request.kubelet.clone(),
                taints: request.taints.clone(),
                labels: options.labels.clone(),
                custom_user_data: request.custom_user_data.clone(),
            },
        )
        .render()
        .context(error::RenderUserDataSnafu)
    }

    async fn image_candidates(&self, request: &LaunchRequest) -> Result<Vec<Ami>> {
        if !request.image_candidates.is_empty() {
            return Ok(request.image_candidates.clone());
        }

        // No explicit selection: look up the recommended image per
        // architecture present in the request.
        let mut architectures = Vec::new();
        for instance_type in &request.instance_types {
            if !architectures.contains(&instance_type.architecture) {
                architectures.push(instance_type.architecture);
            }
        }

        let mut image_ids = Vec::new();
        for architecture in architectures {
            let Some(path) =
                recommended_image_parameter(request.family, architecture, &request.cluster_version)
            else {
                continue;
            };
            let image_id = self
                .client
                .get_parameter(path.clone())
                .await
                .context(error::GetParameterSnafu { path })?;
            if !image_ids.contains(&image_id) {
                image_ids.push(image_id);
            }
        }
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.client
            .describe_images(image_ids)
            .await
            .context(error::DescribeImagesSnafu)
    }
}

/// Parameter-store path for the recommended image of a family/architecture
/// at a cluster version.  The Custom family has no recommended image.
fn recommended_image_parameter(
    family: OsFamily,
    architecture: Architecture,
    cluster_version: &str,
) -> Option<String> {
    let path = match (family, architecture) {
        (OsFamily::Al2, Architecture::Amd64) => format!(
            "/aws/service/eks/optimized-ami/{cluster_version}/amazon-linux-2/recommended/image_id"
        ),
        (OsFamily::Al2, Architecture::Arm64) => format!(
            "/aws/service/eks/optimized-ami/{cluster_version}/amazon-linux-2-arm64/recommended/image_id"
        ),
        (OsFamily::Al2023, arch) => format!(
            "/aws/service/eks/optimized-ami/{cluster_version}/amazon-linux-2023/{}/standard/recommended/image_id",
            match arch {
                Architecture::Amd64 => "x86_64",
                Architecture::Arm64 => "arm64",
            }
        ),
        (OsFamily::Bottlerocket, arch) => format!(
            "/aws/service/bottlerocket/aws-k8s-{cluster_version}/{}/latest/image_id",
            match arch {
                Architecture::Amd64 => "x86_64",
                Architecture::Arm64 => "arm64",
            }
        ),
        (OsFamily::Windows, Architecture::Amd64) => format!(
            "/aws/service/ami-windows-latest/Windows_Server-2022-English-Core-EKS_Optimized-{cluster_version}/image_id"
        ),
        (OsFamily::Windows, Architecture::Arm64) => return None,
        (OsFamily::Custom, _) => return None,
    };
    Some(path)
}

mod error {
    use super::ApiError;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Unable to create launch template '{}': {}", name, source))]
        CreateLaunchTemplate { name: String, source: ApiError },

        #[snafu(display("Unable to create fleet: {}", source))]
        CreateFleet { source: ApiError },

        #[snafu(display("Unable to describe images: {}", source))]
        DescribeImages { source: ApiError },

        #[snafu(display("Unable to describe instance types: {}", source))]
        DescribeInstanceTypes { source: ApiError },

        #[snafu(display("Unable to read parameter '{}': {}", path, source))]
        GetParameter { path: String, source: ApiError },

        #[snafu(display("Unable to render user data: {}", source))]
        RenderUserData { source: bootstrap_userdata::Error },
    }
}

pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;
