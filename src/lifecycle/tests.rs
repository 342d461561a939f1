//! Unit tests for instance creation, inspection, polling, and deletion.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;

use super::{InstanceManager, PollPolicy};
use crate::error::{ApiError, ErrorKind};
use crate::instance::{InstanceSpec, InstanceStatus, ResolvedInstanceSpec};
use crate::test_support::{ScriptedTransport, error_body, instance_body};
use crate::transport::Method;
use crate::types::{InstanceId, ResourceId};

const INSTANCE_PATH: &str = "/compute/v1/instances/inst-1";

#[fixture]
fn transport() -> ScriptedTransport {
    ScriptedTransport::new()
}

fn resolved(startup_script: Option<&str>, groups: &[&str]) -> ResolvedInstanceSpec {
    let spec = InstanceSpec::builder()
        .name("trainer")
        .instance_type("vcpu-4_memory-12g_disk-80g_nvidia1080ti-1")
        .image_name("Ubuntu 18.04")
        .ssh_key_name("mykey")
        .security_group_names(groups.iter().copied())
        .startup_script(startup_script.map(str::to_owned))
        .build()
        .unwrap_or_else(|err| panic!("spec fixture should be valid: {err}"));
    ResolvedInstanceSpec {
        spec,
        image_id: ResourceId::from("img-1"),
        ssh_key_ids: vec![ResourceId::from("key-1")],
        security_group_ids: groups
            .iter()
            .enumerate()
            .map(|(index, _)| ResourceId::new(format!("sg-{}", index + 1)))
            .collect(),
    }
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(1), max_attempts)
}

#[rstest]
#[tokio::test]
async fn create_posts_resolved_ids_and_returns_instance_id(transport: ScriptedTransport) {
    transport.push(
        Method::Post,
        "/compute/v1/instances",
        201,
        instance_body("inst-1", "enqueued", None),
    );

    let id = InstanceManager::new(&transport)
        .create(resolved(Some("#!/bin/bash\necho hi"), &["standard"]))
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert_eq!(id, InstanceId::from("inst-1"));
    let requests = transport.requests_to(Method::Post, "/compute/v1/instances");
    let body = requests
        .first()
        .and_then(|request| request.body.clone())
        .unwrap_or_else(|| panic!("create should send a body"));
    assert_eq!(
        body,
        json!({
            "name": "trainer",
            "hostname": "trainer",
            "type": "vcpu-4_memory-12g_disk-80g_nvidia1080ti-1",
            "image": "img-1",
            "ssh_keys": ["key-1"],
            "security_groups": ["sg-1"],
            "metadata": {"startup_script": "#!/bin/bash\necho hi"},
        })
    );
}

#[rstest]
#[tokio::test]
async fn create_omits_empty_groups_and_missing_script(transport: ScriptedTransport) {
    transport.push(
        Method::Post,
        "/compute/v1/instances",
        201,
        instance_body("inst-1", "enqueued", None),
    );

    InstanceManager::new(&transport)
        .create(resolved(None, &[]))
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    let body = transport
        .requests()
        .first()
        .and_then(|request| request.body.clone())
        .unwrap_or_else(|| panic!("create should send a body"));
    assert!(body.get("security_groups").is_none(), "body: {body}");
    assert!(body.get("metadata").is_none(), "body: {body}");
}

#[rstest]
#[case(422, ErrorKind::Validation)]
#[case(401, ErrorKind::Auth)]
#[case(500, ErrorKind::Server)]
#[case(200, ErrorKind::Server)]
#[tokio::test]
async fn create_requires_exactly_201(
    transport: ScriptedTransport,
    #[case] status: u16,
    #[case] kind: ErrorKind,
) {
    transport.push(
        Method::Post,
        "/compute/v1/instances",
        status,
        error_body("bad_request", "type is not available"),
    );

    let err = InstanceManager::new(&transport)
        .create(resolved(None, &["standard"]))
        .await
        .expect_err("non-201 create should fail");

    assert_eq!(err.kind(), kind, "status {status}: {err}");
}

#[rstest]
#[tokio::test]
async fn create_without_instance_id_is_a_decode_error(transport: ScriptedTransport) {
    transport.push(
        Method::Post,
        "/compute/v1/instances",
        201,
        json!({"instance": {}}),
    );

    let err = InstanceManager::new(&transport)
        .create(resolved(None, &[]))
        .await
        .expect_err("missing id should fail");

    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[rstest]
#[tokio::test]
async fn get_reports_status_and_address(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "active", Some("1.2.3.4")),
    );

    let instance = InstanceManager::new(&transport)
        .get(&InstanceId::from("inst-1"))
        .await
        .unwrap_or_else(|err| panic!("get should succeed: {err}"));

    assert_eq!(instance.status, InstanceStatus::Active);
    assert_eq!(
        instance.public_ip,
        Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)))
    );
}

#[rstest]
#[tokio::test]
async fn status_reports_unmodelled_values_verbatim(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "migrating", None),
    );

    let status = InstanceManager::new(&transport)
        .status(&InstanceId::from("inst-1"))
        .await
        .unwrap_or_else(|err| panic!("status should succeed: {err}"));

    assert_eq!(status, InstanceStatus::Unknown(String::from("migrating")));
    assert_eq!(status.to_string(), "migrating");
}

#[rstest]
#[tokio::test]
async fn public_address_requires_an_assigned_ip(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "creating", None),
    );

    let err = InstanceManager::new(&transport)
        .public_address(&InstanceId::from("inst-1"))
        .await
        .expect_err("missing address should fail");

    assert_eq!(
        err,
        ApiError::MissingPublicIp {
            instance_id: InstanceId::from("inst-1"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn invalid_public_ip_is_a_decode_error(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "active", Some("not-an-ip")),
    );

    let err = InstanceManager::new(&transport)
        .get(&InstanceId::from("inst-1"))
        .await
        .expect_err("bad address should fail");

    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[rstest]
#[tokio::test]
async fn wait_terminates_exactly_when_active(transport: ScriptedTransport) {
    for (status, ip) in [
        ("enqueued", None),
        ("creating", None),
        ("active", Some("1.2.3.4")),
        ("active", Some("1.2.3.4")),
    ] {
        transport.push(Method::Get, INSTANCE_PATH, 200, instance_body("inst-1", status, ip));
    }

    let outcome = InstanceManager::new(&transport)
        .wait_until_active(&InstanceId::from("inst-1"), &fast_policy(10))
        .await
        .unwrap_or_else(|err| panic!("wait should succeed: {err}"));

    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.instance.status, InstanceStatus::Active);
    assert_eq!(transport.count(Method::Get, INSTANCE_PATH), 3);
    assert_eq!(transport.pending(), 1);
}

#[rstest]
#[tokio::test]
async fn wait_aborts_on_first_failing_poll(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "creating", None),
    );
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        503,
        error_body("unavailable", "try later"),
    );
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "active", Some("1.2.3.4")),
    );

    let err = InstanceManager::new(&transport)
        .wait_until_active(&InstanceId::from("inst-1"), &fast_policy(10))
        .await
        .expect_err("failing poll should abort");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(transport.count(Method::Get, INSTANCE_PATH), 2);
}

#[rstest]
#[tokio::test]
async fn wait_fails_fast_on_error_status(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "creating", None),
    );
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "error", None),
    );

    let err = InstanceManager::new(&transport)
        .wait_until_active(&InstanceId::from("inst-1"), &fast_policy(10))
        .await
        .expect_err("error status should abort");

    assert_eq!(
        err,
        ApiError::InstanceFailed {
            instance_id: InstanceId::from("inst-1"),
            status: String::from("error"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn transition_waits_until_status_leaves_active(transport: ScriptedTransport) {
    for status in ["active", "active", "copying", "active"] {
        transport.push(
            Method::Get,
            INSTANCE_PATH,
            200,
            instance_body("inst-1", status, Some("1.2.3.4")),
        );
    }

    let outcome = InstanceManager::new(&transport)
        .wait_for_transition(
            &InstanceId::from("inst-1"),
            &InstanceStatus::Active,
            &fast_policy(10),
        )
        .await
        .unwrap_or_else(|err| panic!("transition should be observed: {err}"));

    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.instance.status, InstanceStatus::Copying);
    assert_eq!(transport.pending(), 1);
}

#[rstest]
#[tokio::test]
async fn transition_into_error_is_a_failure(transport: ScriptedTransport) {
    transport.push(
        Method::Get,
        INSTANCE_PATH,
        200,
        instance_body("inst-1", "error", None),
    );

    let err = InstanceManager::new(&transport)
        .wait_for_transition(
            &InstanceId::from("inst-1"),
            &InstanceStatus::Active,
            &fast_policy(10),
        )
        .await
        .expect_err("error status is not a transition");

    assert_eq!(err.kind(), ErrorKind::ProviderState);
}

#[rstest]
#[tokio::test]
async fn wait_times_out_after_max_attempts(transport: ScriptedTransport) {
    for _ in 0..5 {
        transport.push(
            Method::Get,
            INSTANCE_PATH,
            200,
            instance_body("inst-1", "creating", None),
        );
    }

    let err = InstanceManager::new(&transport)
        .wait_until_active(&InstanceId::from("inst-1"), &fast_policy(3))
        .await
        .expect_err("wait should time out");

    assert_eq!(
        err,
        ApiError::Timeout {
            instance_id: InstanceId::from("inst-1"),
            target: String::from("active"),
            last_status: String::from("creating"),
            polls: 3,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[rstest]
#[tokio::test]
async fn wait_times_out_at_deadline(transport: ScriptedTransport) {
    for _ in 0..5 {
        transport.push(
            Method::Get,
            INSTANCE_PATH,
            200,
            instance_body("inst-1", "creating", None),
        );
    }
    let policy = PollPolicy::fixed(Duration::from_millis(50), 100)
        .with_timeout(Some(Duration::from_millis(10)))
        .with_max_attempts(None);

    let err = InstanceManager::new(&transport)
        .wait_until_active(&InstanceId::from("inst-1"), &policy)
        .await
        .expect_err("wait should hit the deadline");

    assert!(
        matches!(err, ApiError::Timeout { polls: 1, .. }),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn delete_requires_exactly_204(transport: ScriptedTransport) {
    transport.push(Method::Delete, INSTANCE_PATH, 204, serde_json::Value::Null);

    InstanceManager::new(&transport)
        .delete(InstanceId::from("inst-1"))
        .await
        .unwrap_or_else(|err| panic!("delete should succeed: {err}"));

    assert_eq!(transport.count(Method::Delete, INSTANCE_PATH), 1);
}

#[rstest]
#[tokio::test]
async fn delete_of_unknown_instance_is_not_found(transport: ScriptedTransport) {
    let err = InstanceManager::new(&transport)
        .delete(InstanceId::from("ghost"))
        .await
        .expect_err("unknown instance should fail");

    assert!(
        matches!(err, ApiError::NotFound { operation: "delete instance", .. }),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn delete_answered_with_200_is_rejected(transport: ScriptedTransport) {
    transport.push(Method::Delete, INSTANCE_PATH, 200, json!({}));

    let err = InstanceManager::new(&transport)
        .delete(InstanceId::from("inst-1"))
        .await
        .expect_err("non-204 delete should fail");

    assert!(
        matches!(
            err,
            ApiError::UnexpectedStatus {
                expected: 204,
                status: 200,
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
}
