//! BDD step definitions for the provisioning orchestrator.

use genlaunch::Orchestrator;
use genlaunch::test_support::{error_body, instance_body, snapshot_body};
use genlaunch::transport::Method;
use rstest_bdd_macros::{given, then, when};
use serde_json::Value;
use tokio::runtime::Runtime;

use super::test_helpers::{INSTANCES, OrchestratorContext, RunOutcome, script_default_resources};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a provider with the default image, SSH key and security group")]
fn default_resources(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    script_default_resources(&orchestrator_context.transport);
    orchestrator_context
}

#[given("the provider creates instance \"{id}\"")]
fn provider_creates(mut orchestrator_context: OrchestratorContext, id: String) -> OrchestratorContext {
    orchestrator_context.instance_id = id;
    orchestrator_context.transport.push(
        Method::Post,
        INSTANCES,
        201,
        instance_body(&orchestrator_context.instance_id, "enqueued", None),
    );
    orchestrator_context
}

#[given("the provider rejects the create request with status \"{status}\"")]
fn provider_rejects_create(orchestrator_context: OrchestratorContext, status: u16) -> OrchestratorContext {
    orchestrator_context.transport.push(
        Method::Post,
        INSTANCES,
        status,
        error_body("invalid", "request rejected"),
    );
    orchestrator_context
}

#[given("the instance becomes active at \"{address}\" after \"{creating}\" creating polls")]
fn instance_becomes_active(
    orchestrator_context: OrchestratorContext,
    address: String,
    creating: u32,
) -> OrchestratorContext {
    let path = orchestrator_context.instance_path();
    let id = orchestrator_context.instance_id.clone();
    for _ in 0..creating {
        orchestrator_context.transport.push(
            Method::Get,
            &path,
            200,
            instance_body(&id, "creating", None),
        );
    }
    orchestrator_context.transport.push(
        Method::Get,
        &path,
        200,
        instance_body(&id, "active", Some(&address)),
    );
    orchestrator_context
}

#[given("polling fails with status \"{status}\"")]
fn polling_fails(orchestrator_context: OrchestratorContext, status: u16) -> OrchestratorContext {
    orchestrator_context.transport.push(
        Method::Get,
        &orchestrator_context.instance_path(),
        status,
        error_body("unavailable", "try again later"),
    );
    orchestrator_context
}

#[given("the provider deletes the instance")]
fn provider_deletes(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    orchestrator_context.transport.push(
        Method::Delete,
        &orchestrator_context.instance_path(),
        204,
        Value::Null,
    );
    orchestrator_context
}

#[given("deleting the instance fails with status \"{status}\"")]
fn delete_fails(orchestrator_context: OrchestratorContext, status: u16) -> OrchestratorContext {
    orchestrator_context.transport.push(
        Method::Delete,
        &orchestrator_context.instance_path(),
        status,
        error_body("internal", "delete failed"),
    );
    orchestrator_context
}

#[given("a snapshot named \"{name}\" is accepted as \"{snapshot_id}\"")]
fn snapshot_accepted(
    mut orchestrator_context: OrchestratorContext,
    name: String,
    snapshot_id: String,
) -> OrchestratorContext {
    let path = orchestrator_context.instance_path();
    let id = orchestrator_context.instance_id.clone();
    orchestrator_context.transport.push(
        Method::Post,
        &format!("{path}/snapshots"),
        201,
        snapshot_body(&snapshot_id, &id, &name),
    );
    for status in ["copying", "active"] {
        orchestrator_context.transport.push(
            Method::Get,
            &path,
            200,
            instance_body(&id, status, Some("1.2.3.4")),
        );
    }
    orchestrator_context.settings.snapshot_name = Some(name);
    orchestrator_context
}

#[when("I orchestrate a run")]
fn orchestrate(orchestrator_context: OrchestratorContext) -> Result<OrchestratorContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let OrchestratorContext {
        transport,
        settings,
        spec,
        instance_id,
        ..
    } = orchestrator_context;

    let orchestrator = Orchestrator::new(transport.clone(), settings.clone());
    let run_spec = spec.clone();
    let result = runtime.block_on(async move { orchestrator.execute(run_spec).await });
    let outcome = match result {
        Ok(report) => RunOutcome::Success(report),
        Err(err) => RunOutcome::Failure(err.to_string()),
    };

    Ok(OrchestratorContext {
        transport,
        settings,
        spec,
        instance_id,
        outcome: Some(outcome),
    })
}

fn success(orchestrator_context: &OrchestratorContext) -> Result<&genlaunch::RunReport, StepError> {
    match &orchestrator_context.outcome {
        Some(RunOutcome::Success(report)) => Ok(report),
        Some(RunOutcome::Failure(err)) => Err(StepError::Assertion(format!(
            "run failed unexpectedly: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run reports address \"{address}\"")]
fn run_reports_address(
    orchestrator_context: &OrchestratorContext,
    address: String,
) -> Result<(), StepError> {
    let report = success(orchestrator_context)?;
    if report.public_ip.to_string() == address {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected address {address}, got {}",
            report.public_ip
        )))
    }
}

#[then("the run reports snapshot \"{snapshot_id}\"")]
fn run_reports_snapshot(
    orchestrator_context: &OrchestratorContext,
    snapshot_id: String,
) -> Result<(), StepError> {
    let report = success(orchestrator_context)?;
    match &report.snapshot {
        Some(snapshot) if snapshot.id.as_str() == snapshot_id => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected snapshot {snapshot_id}, got {other:?}"
        ))),
    }
}

#[then("the run fails with \"{expected}\"")]
fn run_fails_with(
    orchestrator_context: &OrchestratorContext,
    expected: String,
) -> Result<(), StepError> {
    match &orchestrator_context.outcome {
        Some(RunOutcome::Failure(message)) if message.contains(&expected) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure containing '{expected}', got {other:?}"
        ))),
    }
}

#[then("the instance was polled \"{count}\" times")]
fn instance_polled(orchestrator_context: &OrchestratorContext, count: usize) -> Result<(), StepError> {
    let actual = orchestrator_context
        .transport
        .count(Method::Get, &orchestrator_context.instance_path());
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} status polls, got {actual}"
        )))
    }
}

#[then("the instance was deleted \"{count}\" times")]
fn instance_deleted(orchestrator_context: &OrchestratorContext, count: usize) -> Result<(), StepError> {
    let actual = orchestrator_context
        .transport
        .count(Method::Delete, &orchestrator_context.instance_path());
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} deletes, got {actual}"
        )))
    }
}

#[then("the create request used image \"{image}\", key \"{key}\" and group \"{group}\"")]
fn create_request_used(
    orchestrator_context: &OrchestratorContext,
    image: String,
    key: String,
    group: String,
) -> Result<(), StepError> {
    let body = orchestrator_context
        .transport
        .requests_to(Method::Post, INSTANCES)
        .first()
        .and_then(|request| request.body.clone())
        .ok_or_else(|| StepError::Assertion(String::from("missing create request")))?;

    let expected = [
        ("image", Value::String(image)),
        ("ssh_keys", Value::Array(vec![Value::String(key)])),
        ("security_groups", Value::Array(vec![Value::String(group)])),
    ];
    for (field, value) in expected {
        if body.get(field) != Some(&value) {
            return Err(StepError::Assertion(format!(
                "expected create body field {field} = {value}, got {body}"
            )));
        }
    }
    Ok(())
}
