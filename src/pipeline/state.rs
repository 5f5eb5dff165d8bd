//! Pipeline lifecycle state.
//!
//! The pipeline is the only writer. Anything else (the signal listener,
//! tests, status reporting) gets a [`StateHandle`] and can only read.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    Uninitialized,
    Opened,
    Grabbing,
    Draining,
    Closed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Opened => "opened",
            Self::Grabbing => "grabbing",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_become(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Uninitialized, Opened)
                | (Opened, Grabbing)
                | (Uninitialized | Opened | Grabbing, Draining)
                | (Draining, Closed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a pipeline's state.
#[derive(Debug, Clone)]
pub struct StateHandle {
    shared: Arc<RwLock<PipelineState>>,
}

impl StateHandle {
    pub fn get(&self) -> PipelineState {
        *self.shared.read()
    }
}

/// The authoritative state value, owned by the pipeline.
#[derive(Debug)]
pub(crate) struct StateCell {
    shared: Arc<RwLock<PipelineState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(RwLock::new(PipelineState::Uninitialized)),
        }
    }

    pub(crate) fn get(&self) -> PipelineState {
        *self.shared.read()
    }

    pub(crate) fn handle(&self) -> StateHandle {
        StateHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Move to `next`. Returns false, leaving the state unchanged, if the
    /// transition is not part of the lifecycle.
    pub(crate) fn advance(&self, next: PipelineState) -> bool {
        let mut state = self.shared.write();
        let old = *state;
        if !old.can_become(next) {
            return false;
        }
        *state = next;
        drop(state);
        info!("pipeline {old} -> {next}");
        true
    }
}
