//! Canon EDSDK live view capture.
//!
//! All EDSDK FFI is behind `#[cfg(feature = "canon")]`; mock-based tests
//! run without the real SDK libraries.

pub mod api;
#[cfg(feature = "canon")]
pub mod ffi;
pub mod live_view;
pub mod mock;
#[cfg(feature = "canon")]
pub mod sdk;
pub mod types;

pub use live_view::CanonCapture;
