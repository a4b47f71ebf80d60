//! Gateway provisioning and supervision.
//!
//! Everything needed to go from "no binary on this machine" to a running,
//! health-checked gateway process:
//!
//! - [`release`] — Resolve a version tag to this platform's release asset
//! - [`install`] — Download and unpack the asset into the managed bin dir
//! - [`supervisor`] — Own and supervise the gateway child process
//! - [`health`] — Probe the running gateway's health endpoint

pub mod health;
pub mod install;
pub mod release;
pub mod supervisor;

pub use health::{HealthProbe, HealthReport, HealthStatus};
pub use install::{ArchiveInstaller, InstalledBinary, ProgressCallback, find_gateway_binary};
pub use release::{ArchiveKind, Release, ReleaseAsset, ReleaseResolver};
pub use supervisor::{
    GatewayStatus, GatewaySupervisor, LogLine, LogStream, ProvisionOutcome, StartOutcome,
    SupervisorState, gateway_environment,
};
