//! CNI wrapper around the calico plugin
//!
//! This wrapper sits where the container runtime expects the calico binary
//! and:
//! - Looks up the pod being attached on ADD
//! - Passes the address from its `bosh.cloudfoundry.org/ip-address`
//!   annotation to calico as `IP` in `CNI_ARGS`
//! - Runs calico with the original stdin and arguments, relaying its
//!   stdout and exit status
//! - Appends an audit record of every invocation

pub mod args;
pub mod audit;
pub mod commands;
pub mod config;
pub mod delegate;
pub mod environment;
pub mod error;
pub mod k8s;
pub mod plugin;
pub mod types;

// Re-export commonly used items
pub use args::CniArgs;
pub use commands::run_wrapper;
pub use config::{NetConf, WrapperConfig};
pub use error::{Result, WrapperError};
pub use plugin::CalicoWrapper;
