//! Relay orchestration: lifecycle state, shutdown coordination and the
//! frame loop itself.

pub mod relay;
pub mod shutdown;
pub mod state;

pub use relay::{Pipeline, StepOutcome};
pub use shutdown::{listen_for_termination, ShutdownController, ShutdownReason};
pub use state::{PipelineState, StateHandle};
