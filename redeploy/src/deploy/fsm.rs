//! Finite state machine for the installed release binary

use serde::{Deserialize, Serialize};

use crate::storage::layout::HostLayout;

/// What is installed at the release binary path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryState {
    /// Nothing installed yet
    Absent,

    /// A current binary, no backup
    Installed,

    /// A current binary plus one backup generation
    BackedUpInstalled,
}

/// Binary event
#[derive(Debug, Clone)]
pub enum BinaryEvent {
    /// A new artifact was built and swapped in
    BuildSucceeded,

    /// The build failed; nothing is swapped
    BuildFailed(String),
}

/// Binary FSM
#[derive(Debug, Clone)]
pub struct BinaryFsm {
    state: BinaryState,
    error: Option<String>,
}

impl BinaryFsm {
    /// Create an FSM in the given state
    pub fn new(state: BinaryState) -> Self {
        Self { state, error: None }
    }

    /// Derive the state from what is on disk.
    ///
    /// A backup without a current binary counts as `Absent`: the next swap
    /// has nothing to back up.
    pub async fn observe(layout: &HostLayout) -> Self {
        let state = match (layout.binary().exists().await, layout.backup().exists().await) {
            (false, _) => BinaryState::Absent,
            (true, false) => BinaryState::Installed,
            (true, true) => BinaryState::BackedUpInstalled,
        };
        Self::new(state)
    }

    /// Get current state
    pub fn state(&self) -> BinaryState {
        self.state
    }

    /// Error of the last failed build, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether installing a new binary must first move the current one aside
    pub fn needs_backup(&self) -> bool {
        self.state != BinaryState::Absent
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: BinaryEvent) -> BinaryState {
        self.state = match (self.state, event) {
            (BinaryState::Absent, BinaryEvent::BuildSucceeded) => {
                self.error = None;
                BinaryState::Installed
            }
            (BinaryState::Installed | BinaryState::BackedUpInstalled, BinaryEvent::BuildSucceeded) => {
                self.error = None;
                BinaryState::BackedUpInstalled
            }

            // A failed build never touches what is installed
            (state, BinaryEvent::BuildFailed(err)) => {
                self.error = Some(err);
                state
            }
        };
        self.state
    }
}
