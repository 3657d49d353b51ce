//! satupgrade-exec: command execution on Satellite and Capsule hosts
//!
//! Every remote action the upgrade workflows take goes through
//! [`RemoteExecutor`]. [`SshExecutor`] talks to the managed hosts,
//! [`LocalExecutor`] runs probes (ping) from the controller itself.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeySource, ResolvedKey};
pub use local::LocalExecutor;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
