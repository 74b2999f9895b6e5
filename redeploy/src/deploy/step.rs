//! A single idempotent reconciliation step

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::exec::CommandRunner;
use crate::storage::layout::HostLayout;

/// What a step had to do to reach its desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// Already in the desired state, nothing changed
    Satisfied,

    /// A change was made
    Applied,
}

/// Everything a step may touch
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Runs commands on the host being reconciled
    pub runner: &'a dyn CommandRunner,

    /// Paths on that host
    pub layout: &'a HostLayout,
}

impl<'a> StepContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a HostLayout) -> Self {
        Self { runner, layout }
    }
}

/// A named desired-state reconciliation.
///
/// Running a step whose state is already satisfied must be a no-op that
/// returns [`StepOutcome::Satisfied`].
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable name used in logs and the step log
    fn name(&self) -> &'static str;

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError>;
}
