//! Core library for the genlaunch provisioning tool.
//!
//! The crate drives the Genesis Cloud compute API through a [`Transport`]
//! capability: it resolves resource names to identifiers, creates an
//! instance, waits for it to become active, optionally snapshots it, and
//! deletes it again (resolve → create → wait → snapshot → delete).

pub mod config;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod resolver;
pub mod run;
pub mod snapshot;
pub mod startup_script;
pub mod test_support;
pub mod transport;
pub mod types;

pub use config::GenesisConfig;
pub use error::{ApiError, ErrorKind};
pub use instance::{
    Instance, InstanceSpec, InstanceSpecBuilder, InstanceStatus, ResolvedInstanceSpec, SpecError,
};
pub use lifecycle::{InstanceManager, PollOutcome, PollPolicy};
pub use resolver::{NamedResource, ResourceKind, ResourceResolver};
pub use run::{Orchestrator, RunError, RunReport, RunSettings};
pub use snapshot::{Snapshot, SnapshotManager};
pub use startup_script::{ScriptSource, StartupScript, StartupScriptError, load_startup_script};
pub use transport::{HttpTransport, Transport};
pub use types::{InstanceId, ResourceId, SnapshotId};
