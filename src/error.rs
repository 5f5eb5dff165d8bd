use thiserror::Error;

/// Relay subsystem errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture device busy: {0}")]
    DeviceBusy(String),

    #[error("no frame within {timeout_ms}ms")]
    CaptureTimeout { timeout_ms: u64 },

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("frame decode failed: {0}")]
    DecodeFailed(String),

    #[error("sink '{sink}' unavailable: {reason}")]
    SinkUnavailable { sink: String, reason: String },

    #[error("sink '{sink}' failed: {reason}")]
    SinkFailed { sink: String, reason: String },

    #[error("pipeline failed to start ({component}): {source}")]
    PipelineInitFailed {
        component: String,
        #[source]
        source: Box<RelayError>,
    },

    #[error("pipeline is closed")]
    PipelineClosed,

    #[error("cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether this error only costs the current frame.
    ///
    /// Timeouts, undecodable previews and unmappable layouts are logged and
    /// the loop moves on to the next frame.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CaptureTimeout { .. } | Self::UnsupportedFormat(_) | Self::DecodeFailed(_)
        )
    }

    /// Wrap an init-phase failure, naming the component that caused it.
    pub fn init_failed(component: impl Into<String>, source: RelayError) -> Self {
        Self::PipelineInitFailed {
            component: component.into(),
            source: Box::new(source),
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, RelayError>;
