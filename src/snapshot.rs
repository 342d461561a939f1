//! Instance disk snapshots.
//!
//! Taking a snapshot moves the owning instance from `active` to `copying` and
//! back. Completion is observed by polling the instance, not the snapshot.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, expect_status};
use crate::lifecycle::instance_path;
use crate::transport::{ApiRequest, Transport};
use crate::types::{InstanceId, SnapshotId};

/// A point-in-time copy of an instance's disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// Provider-assigned identifier.
    pub id: SnapshotId,
    /// Instance the snapshot was taken from.
    pub instance_id: InstanceId,
    /// Snapshot name.
    pub name: String,
    /// Status reported at creation, when present.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    snapshot: SnapshotBody,
}

#[derive(Debug, Deserialize)]
struct SnapshotBody {
    id: SnapshotId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resource_id: Option<InstanceId>,
}

/// Requests snapshots of instances.
#[derive(Clone, Debug)]
pub struct SnapshotManager<T> {
    transport: T,
}

impl<T: Transport> SnapshotManager<T> {
    /// Creates a manager issuing requests through `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Requests a snapshot of `instance_id` named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] unless the provider answers `201` with a
    /// `snapshot.id`.
    pub async fn create(&self, instance_id: &InstanceId, name: &str) -> Result<Snapshot, ApiError> {
        const OPERATION: &str = "create snapshot";
        let request = ApiRequest::post(
            format!("{}/snapshots", instance_path(instance_id)),
            json!({ "name": name }),
        );
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|err| ApiError::transport(OPERATION, &err))?;
        expect_status(OPERATION, 201, &response)?;

        let SnapshotEnvelope { snapshot } = serde_json::from_value(response.body)
            .map_err(|err| ApiError::decode(OPERATION, err.to_string()))?;
        let created = Snapshot {
            id: snapshot.id,
            instance_id: snapshot
                .resource_id
                .unwrap_or_else(|| instance_id.clone()),
            name: snapshot.name.unwrap_or_else(|| name.to_owned()),
            status: snapshot.status,
        };

        info!(snapshot_id = %created.id, instance_id = %created.instance_id, name = %created.name, "snapshot requested");
        Ok(created)
    }
}
