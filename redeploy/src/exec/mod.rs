//! Command execution on the host a pipeline targets.
//!
//! `CommandRunner` is the seam every step talks through. `LocalRunner` runs
//! commands on this machine, `SshRunner` on a remote one, and `MockRunner`
//! records commands and answers them from preset rules.

pub mod mock;
pub mod runner;
pub mod ssh;

pub use mock::MockRunner;
pub use runner::{shell_escape, CommandOutput, CommandRunner, LocalHost, LocalRunner, ShellCommand};
pub use ssh::SshRunner;
