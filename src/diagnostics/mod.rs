pub mod stats;

pub use stats::{RelaySnapshot, RelayStats};
