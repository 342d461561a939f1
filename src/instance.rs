//! Instance specifications and the provider-owned instance model.

use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use crate::types::{InstanceId, ResourceId};

/// Parameters describing the instance to create.
///
/// Names are human readable; the resolver maps them to provider identifiers
/// before the specification is submitted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Instance name, unique per account. Also used as the hostname.
    pub name: String,
    /// Machine type identifier (for example
    /// `vcpu-4_memory-12g_disk-80g_nvidia1080ti-1`).
    pub instance_type: String,
    /// Image name resolved to an image identifier.
    pub image_name: String,
    /// SSH key names. The provider currently accepts exactly one key.
    pub ssh_key_names: Vec<String>,
    /// Security group names. When empty the provider applies its implicit
    /// `standard` group.
    pub security_group_names: Vec<String>,
    /// Optional script executed on first boot.
    pub startup_script: Option<String>,
}

impl InstanceSpec {
    /// Starts a builder for an [`InstanceSpec`].
    #[must_use]
    pub fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new()
    }

    /// Validates the specification, returning a descriptive error when a
    /// required field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Validation`] when a required field is empty and
    /// [`SpecError::SshKeyCount`] unless exactly one SSH key is named.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::Validation("name".to_owned()));
        }
        if self.instance_type.is_empty() {
            return Err(SpecError::Validation("instance_type".to_owned()));
        }
        if self.image_name.is_empty() {
            return Err(SpecError::Validation("image_name".to_owned()));
        }
        if self.ssh_key_names.len() != 1 {
            return Err(SpecError::SshKeyCount(self.ssh_key_names.len()));
        }
        if self.ssh_key_names.iter().any(String::is_empty) {
            return Err(SpecError::Validation("ssh_key_names".to_owned()));
        }
        if self.security_group_names.iter().any(String::is_empty) {
            return Err(SpecError::Validation("security_group_names".to_owned()));
        }
        if self
            .startup_script
            .as_deref()
            .is_some_and(|script| script.trim().is_empty())
        {
            return Err(SpecError::Validation("startup_script".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceSpec`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceSpecBuilder {
    name: String,
    instance_type: String,
    image_name: String,
    ssh_key_names: Vec<String>,
    security_group_names: Vec<String>,
    startup_script: Option<String>,
}

impl InstanceSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the machine type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the image name.
    #[must_use]
    pub fn image_name(mut self, value: impl Into<String>) -> Self {
        self.image_name = value.into();
        self
    }

    /// Appends an SSH key name.
    #[must_use]
    pub fn ssh_key_name(mut self, value: impl Into<String>) -> Self {
        self.ssh_key_names.push(value.into());
        self
    }

    /// Appends a security group name.
    #[must_use]
    pub fn security_group_name(mut self, value: impl Into<String>) -> Self {
        self.security_group_names.push(value.into());
        self
    }

    /// Replaces the security group names.
    #[must_use]
    pub fn security_group_names<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_group_names = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the optional startup script.
    #[must_use]
    pub fn startup_script(mut self, value: Option<String>) -> Self {
        self.startup_script = value;
        self
    }

    /// Builds and validates the [`InstanceSpec`], trimming names.
    ///
    /// The startup script is kept verbatim; only its blankness is checked.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when validation fails.
    pub fn build(self) -> Result<InstanceSpec, SpecError> {
        let trim_all = |values: Vec<String>| -> Vec<String> {
            values.iter().map(|value| value.trim().to_owned()).collect()
        };
        let spec = InstanceSpec {
            name: self.name.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            image_name: self.image_name.trim().to_owned(),
            ssh_key_names: trim_all(self.ssh_key_names),
            security_group_names: trim_all(self.security_group_names),
            startup_script: self.startup_script,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// An [`InstanceSpec`] whose names have been mapped to provider identifiers.
///
/// Produced by the resolver and consumed once by instance creation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedInstanceSpec {
    /// Specification the identifiers were resolved from.
    pub spec: InstanceSpec,
    /// Identifier of the boot image.
    pub image_id: ResourceId,
    /// Identifiers of the SSH keys, in the order they were named.
    pub ssh_key_ids: Vec<ResourceId>,
    /// Identifiers of the security groups, in the order they were named.
    pub security_group_ids: Vec<ResourceId>,
}

/// Lifecycle status reported by the provider.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum InstanceStatus {
    /// Accepted and waiting for capacity.
    Enqueued,
    /// Being provisioned.
    Creating,
    /// Booted and reachable; the ready state.
    Active,
    /// Disk is being copied for a snapshot.
    Copying,
    /// Powered off.
    Shutoff,
    /// Powering on.
    Starting,
    /// Powering off.
    Stopping,
    /// Rebooting.
    Restarting,
    /// Being deleted.
    Deleting,
    /// Provisioning or an operation failed; terminal.
    Error,
    /// Any status this crate does not model.
    Unknown(String),
}

impl InstanceStatus {
    /// Parses the wire representation.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "enqueued" => Self::Enqueued,
            "creating" => Self::Creating,
            "active" => Self::Active,
            "copying" => Self::Copying,
            "shutoff" => Self::Shutoff,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "restarting" => Self::Restarting,
            "deleting" => Self::Deleting,
            "error" => Self::Error,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Copying => "copying",
            Self::Shutoff => "shutoff",
            Self::Starting => "starting",
            Self::Stopping => "stopping",
            Self::Restarting => "restarting",
            Self::Deleting => "deleting",
            Self::Error => "error",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// Returns `true` for statuses the instance never leaves on its own.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of an instance as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Provider-assigned identifier.
    pub id: InstanceId,
    /// Current status.
    pub status: InstanceStatus,
    /// Public address; absent until the instance is active.
    pub public_ip: Option<IpAddr>,
}

/// Errors raised while validating an [`InstanceSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when a required field is missing or blank.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when the number of SSH keys is not exactly one.
    #[error("exactly one SSH key is supported, got {0}")]
    SshKeyCount(usize),
}
