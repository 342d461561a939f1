//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::instance::{InstanceSpec, SpecError};
use crate::lifecycle::PollPolicy;
use crate::resolver::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::run::RunSettings;
use crate::startup_script::{StartupScript, StartupScriptError, load_startup_script};
use crate::transport::{DEFAULT_API_BASE_URL, HttpTransport, TransportError};

const CONFIG_FILE: &str = "genlaunch.toml";
const SECTION: &str = "genesis";

/// Genesis Cloud settings derived from environment variables, configuration
/// files, and defaults.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GENESIS",
    discovery(
        app_name = "genlaunch",
        env_var = "GENLAUNCH_CONFIG_PATH",
        config_file_name = "genlaunch.toml",
        dotfile_name = ".genlaunch.toml",
        project_file_name = "genlaunch.toml"
    )
)]
pub struct GenesisConfig {
    /// API token sent as `X-Auth-Token`. Required.
    #[ortho_config(default = String::new())]
    pub api_token: String,
    /// Base URL of the compute API.
    #[ortho_config(default = DEFAULT_API_BASE_URL.to_owned())]
    pub api_base_url: String,
    /// Name of the SSH key registered with the account. Required.
    #[ortho_config(default = String::new())]
    pub ssh_key_name: String,
    /// Name (and hostname) of the instance to create. Required.
    #[ortho_config(default = String::new())]
    pub instance_name: String,
    /// Machine type identifier.
    #[ortho_config(default = "vcpu-4_memory-12g_disk-80g_nvidia1080ti-1".to_owned())]
    pub instance_type: String,
    /// Image name, resolved to an ID at run time.
    #[ortho_config(default = "Ubuntu 18.04".to_owned())]
    pub image: String,
    /// Comma-separated security group names. An empty value lets the
    /// provider apply its implicit default group.
    #[ortho_config(default = "standard".to_owned())]
    pub security_groups: String,
    /// Inline startup script.
    pub startup_script: Option<String>,
    /// Path to a startup script file. Supports `~/`.
    pub startup_script_file: Option<String>,
    /// Page size used when listing resources.
    #[ortho_config(default = DEFAULT_PER_PAGE)]
    pub per_page: u32,
    /// Initial delay between status polls, in seconds.
    #[ortho_config(default = 1)]
    pub poll_interval_secs: u64,
    /// Upper bound for the delay between status polls, in seconds.
    #[ortho_config(default = 15)]
    pub poll_max_interval_secs: u64,
    /// Deadline for a single wait, in seconds.
    #[ortho_config(default = 600)]
    pub wait_timeout_secs: u64,
    /// Snapshot to take before deletion.
    pub snapshot_name: Option<String>,
    /// Seconds to keep the instance running once it is active.
    #[ortho_config(default = 0)]
    pub hold_secs: u64,
    /// Leave the instance running when a run fails after creation.
    #[ortho_config(default = false)]
    pub keep_on_failure: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl GenesisConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [{SECTION}] in {CONFIG_FILE}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, field: &'static str) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                field,
                message: String::from("must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("genlaunch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Missing required values produce errors
    /// naming both the environment variable and the TOML key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        self.startup_script()?;
        Ok(())
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        self.validate_access()?;
        Self::require_field(
            &self.ssh_key_name,
            &FieldMetadata::new("SSH key name", "GENESIS_SSH_KEY_NAME", "ssh_key_name"),
        )?;
        Self::require_field(
            &self.instance_name,
            &FieldMetadata::new("instance name", "GENESIS_INSTANCE_NAME", "instance_name"),
        )?;
        Self::require_field(
            &self.instance_type,
            &FieldMetadata::new("instance type", "GENESIS_INSTANCE_TYPE", "instance_type"),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("image name", "GENESIS_IMAGE", "image"),
        )?;
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(ConfigError::InvalidValue {
                field: "per_page",
                message: format!("must be between 1 and {MAX_PER_PAGE}"),
            });
        }
        Self::require_positive(self.poll_interval_secs, "poll_interval_secs")?;
        Self::require_positive(self.poll_max_interval_secs, "poll_max_interval_secs")?;
        Self::require_positive(self.wait_timeout_secs, "wait_timeout_secs")?;
        if let Some(name) = self.snapshot_name.as_deref()
            && name.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "snapshot_name",
                message: String::from("must not be empty"),
            });
        }
        Ok(())
    }

    /// Validates only the fields needed to talk to the API. Used by
    /// commands that do not create an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the token or base URL is
    /// empty.
    pub fn validate_access(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_token,
            &FieldMetadata::new("Genesis Cloud API token", "GENESIS_API_TOKEN", "api_token"),
        )?;
        Self::require_field(
            &self.api_base_url,
            &FieldMetadata::new("API base URL", "GENESIS_API_BASE_URL", "api_base_url"),
        )
    }

    /// Returns the configured security group names, trimmed, without empty
    /// entries.
    #[must_use]
    pub fn security_group_names(&self) -> Vec<String> {
        self.security_groups
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Loads the startup script from the inline value or the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StartupScript`] when both sources are set,
    /// the script is blank, or the file cannot be read.
    pub fn startup_script(&self) -> Result<Option<StartupScript>, ConfigError> {
        Ok(load_startup_script(
            self.startup_script.as_deref(),
            self.startup_script_file.as_deref(),
        )?)
    }

    /// Builds the [`InstanceSpec`] described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn instance_spec(&self) -> Result<InstanceSpec, ConfigError> {
        self.validate_settings()?;
        let startup_script = self.startup_script()?;
        Ok(InstanceSpec::builder()
            .name(&self.instance_name)
            .instance_type(&self.instance_type)
            .image_name(&self.image)
            .ssh_key_name(&self.ssh_key_name)
            .security_group_names(self.security_group_names())
            .startup_script(startup_script.map(String::from))
            .build()?)
    }

    /// Polling policy derived from the interval and timeout settings.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_interval: Duration::from_secs(self.poll_max_interval_secs),
            timeout: Some(Duration::from_secs(self.wait_timeout_secs)),
            max_attempts: None,
            ..PollPolicy::default()
        }
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            per_page: self.per_page,
            poll: self.poll_policy(),
            hold: Duration::from_secs(self.hold_secs),
            snapshot_name: self
                .snapshot_name
                .as_deref()
                .map(str::trim)
                .map(ToOwned::to_owned),
            keep_on_failure: self.keep_on_failure,
        }
    }

    /// Builds the HTTP transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the token or base URL is
    /// empty, or [`ConfigError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn transport(&self) -> Result<HttpTransport, ConfigError> {
        self.validate_access()?;
        Ok(HttpTransport::new(
            self.api_base_url.as_str(),
            self.api_token.as_str(),
        )?)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// TOML key of the offending field.
        field: &'static str,
        /// What is wrong with the value.
        message: String,
    },
    /// Surfaces a failure to build the HTTP client.
    #[error("failed to prepare the API client: {0}")]
    Transport(#[from] TransportError),
    /// Surfaces startup script resolution failures.
    #[error(transparent)]
    StartupScript(#[from] StartupScriptError),
    /// Surfaces instance specification validation failures.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
