//! BDD scenarios for the provisioning orchestrator.

use rstest_bdd_macros::scenario;

use super::test_helpers::{OrchestratorContext, orchestrator_context};

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Round trip deletes the instance after it becomes active"
)]
fn scenario_round_trip(orchestrator_context: OrchestratorContext) {
    let _ = orchestrator_context;
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Rejected create never polls or deletes"
)]
fn scenario_rejected_create(orchestrator_context: OrchestratorContext) {
    let _ = orchestrator_context;
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Polling failure tears the instance down"
)]
fn scenario_polling_failure(orchestrator_context: OrchestratorContext) {
    let _ = orchestrator_context;
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Teardown failure is surfaced after a successful run"
)]
fn scenario_teardown_failure(orchestrator_context: OrchestratorContext) {
    let _ = orchestrator_context;
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Snapshot is taken before deletion"
)]
fn scenario_snapshot_before_deletion(orchestrator_context: OrchestratorContext) {
    let _ = orchestrator_context;
}
