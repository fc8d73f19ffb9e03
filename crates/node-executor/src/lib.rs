//! Node Executor - deploying loops to clients and running them there
//!
//! Two halves of one protocol:
//!
//! - [`DeploymentManager`] (manager side) ships a loop's subgraph to its
//!   client, tracks the `idle -> pending -> deployed` lifecycle with a
//!   timeout, and ingests status reports.
//! - [`ExecutorHost`] (client side) validates and installs deployed graphs,
//!   runs them on a tick, and answers every command with an
//!   [`ExecutorReport`].
//!
//! Commands travel as `plugin` envelopes with `pluginId = node-executor`;
//! reports come back as `data` envelopes carrying a `nodeExecutor` sample.

pub mod commands;
pub mod config;
pub mod deployment;
pub mod error;
pub mod host;

pub use commands::{ExecutorCommand, ExecutorEvent, ExecutorReport};
pub use config::{DeployConfig, HostConfig};
pub use deployment::{
    ClientExecutorStatus, DeployLink, DeploymentManager, DeploymentObserver, DeploymentState, NullObserver,
    StatusEntry,
};
pub use error::{ExecutorError, Result};
pub use host::ExecutorHost;
