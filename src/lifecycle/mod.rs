//! Instance lifecycle: create, inspect, wait, and delete.
//!
//! Every call checks for the exact success code the API documents (`201` for
//! create, `200` for reads, `204` for delete); anything else is classified
//! into an [`ApiError`] carrying the raw response body.

mod wait;

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, expect_status};
use crate::instance::{Instance, InstanceStatus, ResolvedInstanceSpec};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{InstanceId, ResourceId};

pub use wait::{PollOutcome, PollPolicy};

pub(crate) const INSTANCES_PATH: &str = "/compute/v1/instances";

pub(crate) fn instance_path(id: &InstanceId) -> String {
    format!("{INSTANCES_PATH}/{id}")
}

#[derive(Debug, Serialize)]
struct CreateInstanceRequest<'a> {
    name: &'a str,
    hostname: &'a str,
    #[serde(rename = "type")]
    instance_type: &'a str,
    image: &'a ResourceId,
    ssh_keys: &'a [ResourceId],
    #[serde(skip_serializing_if = "no_ids")]
    security_groups: &'a [ResourceId],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata<'a>>,
}

fn no_ids(ids: &&[ResourceId]) -> bool {
    ids.is_empty()
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    startup_script: &'a str,
}

#[derive(Debug, Deserialize)]
struct InstanceEnvelope {
    instance: InstanceBody,
}

#[derive(Debug, Deserialize)]
struct InstanceBody {
    id: InstanceId,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    public_ip: Option<String>,
}

impl InstanceBody {
    fn into_instance(self, operation: &'static str) -> Result<Instance, ApiError> {
        let public_ip = self
            .public_ip
            .filter(|ip| !ip.is_empty())
            .map(|ip| {
                IpAddr::from_str(&ip).map_err(|err| {
                    ApiError::decode(operation, format!("invalid public_ip '{ip}': {err}"))
                })
            })
            .transpose()?;
        let status = self
            .status
            .ok_or_else(|| ApiError::decode(operation, "missing `instance.status`"))?;
        Ok(Instance {
            id: self.id,
            status: InstanceStatus::from_wire(&status),
            public_ip,
        })
    }
}

fn decode_envelope(operation: &'static str, response: ApiResponse) -> Result<InstanceBody, ApiError> {
    serde_json::from_value::<InstanceEnvelope>(response.body)
        .map(|envelope| envelope.instance)
        .map_err(|err| ApiError::decode(operation, err.to_string()))
}

/// Creates, inspects, and deletes instances.
#[derive(Clone, Debug)]
pub struct InstanceManager<T> {
    transport: T,
}

impl<T: Transport> InstanceManager<T> {
    /// Creates a manager issuing requests through `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: &ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.transport
            .send(request)
            .await
            .map_err(|err| ApiError::transport(operation, &err))
    }

    /// Submits `resolved` and returns the new instance's identifier.
    ///
    /// The resolved specification is consumed: a specification is submitted
    /// at most once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] unless the provider answers `201` with an
    /// `instance.id`.
    pub async fn create(&self, resolved: ResolvedInstanceSpec) -> Result<InstanceId, ApiError> {
        const OPERATION: &str = "create instance";
        let spec = &resolved.spec;
        let payload = CreateInstanceRequest {
            name: &spec.name,
            hostname: &spec.name,
            instance_type: &spec.instance_type,
            image: &resolved.image_id,
            ssh_keys: &resolved.ssh_key_ids,
            security_groups: &resolved.security_group_ids,
            metadata: spec.startup_script.as_deref().map(|script| Metadata {
                startup_script: script,
            }),
        };
        let body = serde_json::to_value(&payload)
            .map_err(|err| ApiError::decode(OPERATION, err.to_string()))?;

        let response = self
            .send(OPERATION, &ApiRequest::post(INSTANCES_PATH, body))
            .await?;
        expect_status(OPERATION, 201, &response)?;
        let instance = decode_envelope(OPERATION, response)?;

        info!(instance_id = %instance.id, name = %spec.name, "instance creation accepted");
        Ok(instance.id)
    }

    /// Reads the instance's current state.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] unless the provider answers `200` with a
    /// well-formed instance.
    pub async fn get(&self, id: &InstanceId) -> Result<Instance, ApiError> {
        const OPERATION: &str = "get instance";
        let response = self
            .send(OPERATION, &ApiRequest::get(instance_path(id)))
            .await?;
        expect_status(OPERATION, 200, &response)?;
        decode_envelope(OPERATION, response)?.into_instance(OPERATION)
    }

    /// Reads the instance's current status.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceManager::get`].
    pub async fn status(&self, id: &InstanceId) -> Result<InstanceStatus, ApiError> {
        Ok(self.get(id).await?.status)
    }

    /// Reads the instance's public address. Only meaningful once the instance
    /// is active.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceManager::get`], plus [`ApiError::MissingPublicIp`]
    /// when no address has been assigned.
    pub async fn public_address(&self, id: &InstanceId) -> Result<IpAddr, ApiError> {
        self.get(id)
            .await?
            .public_ip
            .ok_or_else(|| ApiError::MissingPublicIp {
                instance_id: id.clone(),
            })
    }

    /// Deletes the instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] unless the provider answers `204`; an unknown
    /// identifier yields [`ApiError::NotFound`].
    pub async fn delete(&self, id: InstanceId) -> Result<(), ApiError> {
        const OPERATION: &str = "delete instance";
        let response = self
            .send(OPERATION, &ApiRequest::delete(instance_path(&id)))
            .await?;
        expect_status(OPERATION, 204, &response)?;
        info!(instance_id = %id, "instance deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
