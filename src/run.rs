//! Orchestrates one end-to-end provisioning run.
//!
//! The run resolves resource names, creates the instance, waits for it to
//! become active, optionally snapshots it, and deletes it. Once the instance
//! exists every failure path attempts to delete it before the error is
//! returned, so a failed run does not leave a paid instance behind.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::instance::{InstanceSpec, InstanceStatus};
use crate::lifecycle::{InstanceManager, PollPolicy};
use crate::resolver::{DEFAULT_PER_PAGE, ResourceResolver};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::transport::Transport;
use crate::types::InstanceId;

/// Errors surfaced while performing a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Raised when a name cannot be resolved; nothing was created.
    #[error("failed to resolve instance resources: {0}")]
    Resolve(#[source] ApiError),
    /// Raised when the provider refuses the create request; nothing was
    /// created.
    #[error("failed to create instance: {0}")]
    Provision(#[source] ApiError),
    /// Raised when the instance does not become active.
    #[error("instance {instance_id} did not become ready: {message}")]
    Wait {
        /// Instance that was being waited on.
        instance_id: InstanceId,
        /// Human-readable description including the cleanup outcome.
        message: String,
        /// Underlying API error.
        #[source]
        source: Box<ApiError>,
    },
    /// Raised when taking the snapshot fails.
    #[error("snapshot of instance {instance_id} failed: {message}")]
    Snapshot {
        /// Instance being snapshotted.
        instance_id: InstanceId,
        /// Human-readable description including the cleanup outcome.
        message: String,
        /// Underlying API error.
        #[source]
        source: Box<ApiError>,
    },
    /// Raised when the run is cancelled before any instance was created.
    #[error("run interrupted before an instance was created")]
    Cancelled,
    /// Raised when the run is cancelled after the instance was created.
    #[error("run interrupted: {message}")]
    Interrupted {
        /// Instance that existed when the run was interrupted.
        instance_id: InstanceId,
        /// Human-readable description including the cleanup outcome.
        message: String,
    },
    /// Raised when the final delete fails after the run succeeded.
    #[error("failed to delete instance {instance_id}: {source}")]
    Teardown {
        /// Instance that could not be deleted.
        instance_id: InstanceId,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },
}

impl RunError {
    /// Returns the instance that may still exist, if the run got that far.
    #[must_use]
    pub const fn instance_id(&self) -> Option<&InstanceId> {
        match self {
            Self::Resolve(_) | Self::Provision(_) | Self::Cancelled => None,
            Self::Wait { instance_id, .. }
            | Self::Snapshot { instance_id, .. }
            | Self::Interrupted { instance_id, .. }
            | Self::Teardown { instance_id, .. } => Some(instance_id),
        }
    }
}

/// Knobs for a run, usually derived from configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSettings {
    /// Page size for resource lookups.
    pub per_page: u32,
    /// Polling policy for readiness and snapshot completion.
    pub poll: PollPolicy,
    /// Time to keep the instance running once it is active.
    pub hold: Duration,
    /// Snapshot to take before deletion, if any.
    pub snapshot_name: Option<String>,
    /// Leave the instance running when the run fails after creation.
    pub keep_on_failure: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            poll: PollPolicy::default(),
            hold: Duration::ZERO,
            snapshot_name: None,
            keep_on_failure: false,
        }
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    /// Identifier of the instance that was created and deleted.
    pub instance_id: InstanceId,
    /// Public address the instance was reachable on.
    pub public_ip: IpAddr,
    /// Status reads performed while waiting, across readiness and snapshot.
    pub status_polls: u32,
    /// Snapshot taken before deletion, if requested.
    pub snapshot: Option<Snapshot>,
}

enum Failure {
    Wait(ApiError),
    Snapshot(ApiError),
    Interrupted,
}

/// Executes the provisioning flow against a transport.
#[derive(Debug)]
pub struct Orchestrator<T> {
    transport: T,
    settings: RunSettings,
}

impl<T: Transport> Orchestrator<T> {
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(transport: T, settings: RunSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Runs resolve → create → wait → (snapshot → wait) → delete.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] for the first failing phase. Failures after
    /// creation include the outcome of the cleanup delete in their message.
    pub async fn execute(&self, spec: InstanceSpec) -> Result<RunReport, RunError> {
        self.execute_until(spec, std::future::pending()).await
    }

    /// Like [`Orchestrator::execute`], but abandons the run and deletes the
    /// instance as soon as `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Cancelled`] when `shutdown` fires while names are
    /// being resolved, [`RunError::Interrupted`] when it fires once the create
    /// request has been sent, otherwise the same errors as
    /// [`Orchestrator::execute`].
    pub async fn execute_until<F>(&self, spec: InstanceSpec, shutdown: F) -> Result<RunReport, RunError>
    where
        F: Future<Output = ()>,
    {
        let resolver =
            ResourceResolver::new(&self.transport).with_per_page(self.settings.per_page);
        let lifecycle = InstanceManager::new(&self.transport);

        tokio::pin!(shutdown);

        let resolved = tokio::select! {
            biased;
            result = resolver.resolve_spec(spec) => result.map_err(RunError::Resolve)?,
            () = &mut shutdown => return Err(RunError::Cancelled),
        };

        // A sent create request is always awaited so its instance can be deleted.
        let create = lifecycle.create(resolved);
        tokio::pin!(create);
        let (instance_id, interrupted) = tokio::select! {
            biased;
            result = &mut create => (result.map_err(RunError::Provision)?, false),
            () = &mut shutdown => {
                warn!("shutdown requested while the create request is in flight");
                ((&mut create).await.map_err(RunError::Provision)?, true)
            }
        };
        if interrupted {
            return Err(self.fail(&lifecycle, instance_id, Failure::Interrupted).await);
        }

        let outcome = tokio::select! {
            biased;
            result = self.drive(&lifecycle, &instance_id) => result,
            () = &mut shutdown => Err(Failure::Interrupted),
        };

        match outcome {
            Ok(report) => {
                lifecycle
                    .delete(instance_id.clone())
                    .await
                    .map_err(|source| RunError::Teardown {
                        instance_id,
                        source,
                    })?;
                Ok(report)
            }
            Err(failure) => Err(self.fail(&lifecycle, instance_id, failure).await),
        }
    }

    async fn drive(
        &self,
        lifecycle: &InstanceManager<&T>,
        instance_id: &InstanceId,
    ) -> Result<RunReport, Failure> {
        let ready = lifecycle
            .wait_until_active(instance_id, &self.settings.poll)
            .await
            .map_err(Failure::Wait)?;
        let public_ip = ready.instance.public_ip.ok_or_else(|| {
            Failure::Wait(ApiError::MissingPublicIp {
                instance_id: instance_id.clone(),
            })
        })?;
        info!(%instance_id, %public_ip, polls = ready.polls, "instance is ready");

        if !self.settings.hold.is_zero() {
            info!(%instance_id, hold_secs = self.settings.hold.as_secs(), "holding instance");
            sleep(self.settings.hold).await;
        }

        let mut status_polls = ready.polls;
        let snapshot = match self.settings.snapshot_name.as_deref() {
            Some(name) => {
                let taken = SnapshotManager::new(&self.transport)
                    .create(instance_id, name)
                    .await
                    .map_err(Failure::Snapshot)?;
                let started = lifecycle
                    .wait_for_transition(instance_id, &InstanceStatus::Active, &self.settings.poll)
                    .await
                    .map_err(Failure::Snapshot)?;
                debug!(%instance_id, status = %started.instance.status, "snapshot in progress");
                let settled = lifecycle
                    .wait_until_active(instance_id, &self.settings.poll)
                    .await
                    .map_err(Failure::Snapshot)?;
                status_polls = status_polls
                    .saturating_add(started.polls)
                    .saturating_add(settled.polls);
                info!(%instance_id, snapshot_id = %taken.id, "snapshot finished");
                Some(taken)
            }
            None => None,
        };

        Ok(RunReport {
            instance_id: instance_id.clone(),
            public_ip,
            status_polls,
            snapshot,
        })
    }

    async fn fail(
        &self,
        lifecycle: &InstanceManager<&T>,
        instance_id: InstanceId,
        failure: Failure,
    ) -> RunError {
        match failure {
            Failure::Wait(source) => {
                let message = self.cleanup_with_note(lifecycle, &instance_id, &source).await;
                RunError::Wait {
                    instance_id,
                    message,
                    source: Box::new(source),
                }
            }
            Failure::Snapshot(source) => {
                let message = self.cleanup_with_note(lifecycle, &instance_id, &source).await;
                RunError::Snapshot {
                    instance_id,
                    message,
                    source: Box::new(source),
                }
            }
            Failure::Interrupted => {
                let message = self
                    .cleanup_with_note(lifecycle, &instance_id, &"shutdown requested")
                    .await;
                RunError::Interrupted {
                    instance_id,
                    message,
                }
            }
        }
    }

    async fn cleanup_with_note<E: std::fmt::Display>(
        &self,
        lifecycle: &InstanceManager<&T>,
        instance_id: &InstanceId,
        err: &E,
    ) -> String {
        let message = err.to_string();
        if self.settings.keep_on_failure {
            warn!(%instance_id, "run failed; leaving instance running as configured");
            return format!("{message} (instance {instance_id} left running)");
        }

        warn!(%instance_id, error = %message, "run failed; deleting instance");
        let teardown_error = lifecycle.delete(instance_id.clone()).await.err();
        append_teardown_note(message, teardown_error.as_ref())
    }
}

fn append_teardown_note(message: String, teardown_error: Option<&ApiError>) -> String {
    match teardown_error {
        Some(teardown) => format!("{message} (teardown also failed: {teardown})"),
        None => message,
    }
}
