//! Shared fixtures for orchestrator BDD scenarios.

use std::time::Duration;

use genlaunch::test_support::{ScriptedTransport, list_body};
use genlaunch::transport::Method;
use genlaunch::{InstanceSpec, PollPolicy, ResourceKind, RunReport, RunSettings};
use rstest::fixture;

use crate::test_constants::{DEFAULT_INSTANCE_TYPE, IMAGE, SECURITY_GROUP, SSH_KEY};

/// Path of the instance collection.
pub const INSTANCES: &str = "/compute/v1/instances";

#[derive(Clone, Debug)]
pub struct OrchestratorContext {
    pub transport: ScriptedTransport,
    pub settings: RunSettings,
    pub spec: InstanceSpec,
    pub instance_id: String,
    pub outcome: Option<RunOutcome>,
}

impl OrchestratorContext {
    pub fn instance_path(&self) -> String {
        format!("{INSTANCES}/{}", self.instance_id)
    }
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success(RunReport),
    Failure(String),
}

#[fixture]
pub fn orchestrator_context() -> OrchestratorContext {
    OrchestratorContext {
        transport: ScriptedTransport::new(),
        settings: RunSettings {
            poll: PollPolicy::fixed(Duration::from_millis(1), 10),
            ..RunSettings::default()
        },
        spec: spec(),
        instance_id: String::from("inst-1"),
        outcome: None,
    }
}

pub fn spec() -> InstanceSpec {
    InstanceSpec::builder()
        .name("genlaunch-bdd")
        .instance_type(DEFAULT_INSTANCE_TYPE)
        .image_name(IMAGE.0)
        .ssh_key_name(SSH_KEY.0)
        .security_group_name(SECURITY_GROUP.0)
        .build()
        .unwrap_or_else(|err| panic!("spec fixture should be valid: {err}"))
}

pub fn script_default_resources(transport: &ScriptedTransport) {
    for (kind, entry) in [
        (ResourceKind::Image, IMAGE),
        (ResourceKind::SshKey, SSH_KEY),
        (ResourceKind::SecurityGroup, SECURITY_GROUP),
    ] {
        transport.push(
            Method::Get,
            kind.path(),
            200,
            list_body(kind.field(), &[entry], Some(1)),
        );
    }
}
