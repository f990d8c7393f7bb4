//! Background installation of the tamarin-prover binary.
//!
//! The installer runs once per process on its own task. Request handlers
//! share the same [`InstallState`] and read it to decide whether the prover
//! may be invoked yet.

pub mod installer;
pub mod state;
pub mod steps;

pub use installer::{spawn, InstallPlan, Installer};
pub use state::{InstallSnapshot, InstallState, Phase, STATUS_LOG_TAIL};
pub use steps::{InstallError, InstallSteps, SystemSteps};
