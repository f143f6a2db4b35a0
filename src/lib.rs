//! Crate entry point for **orion**.
//!
//! This library implements the setup wizard behind the `orion` CLI: it gets
//! a notebook repository onto disk, brings existing checkouts up to date on
//! a fresh session branch, and provisions the pixi environment inside.
//! Each submodule owns one responsibility (git access, provisioning, the
//! setup flows, persisted state, etc.).
//!
//! This file is primarily intended for developers hacking on `orion`.

pub mod env;
pub mod error;
pub mod git;
pub mod lock;
pub mod logging;
pub mod paths;
pub mod pixi;
pub mod process;
mod progress;
pub mod repo;
pub mod settings;
pub mod setup;
pub mod state;
pub mod status;

/// Re-export the commands and core types so they can be accessed from `orion::*`.
pub use error::SetupError;
pub use paths::orion_home;
pub use pixi::{EnvironmentProvisioner, ManagerStatus};
pub use repo::{CloneOutcome, RepositoryDescriptor, RepositorySynchronizer, SyncResult};
pub use setup::{
    CloneArgs, Orchestrator, RunOptions, SetupMode, SetupOutcome, SetupRequest, cmd_express,
    cmd_launch, cmd_setup_clone, cmd_setup_existing,
};
pub use status::{RepoStatus, cmd_status};
