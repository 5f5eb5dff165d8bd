//! On-screen preview sink.

use std::time::Duration;

use tracing::debug;

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};

use super::{Key, OutputFormat, PreviewSinkConfig, PushOutcome, Sink, SinkDescriptor};

/// How long a push waits for a key press after rendering.
pub const KEY_POLL_WAIT: Duration = Duration::from_millis(1);

/// A window (or anything else) that can display frames and report keys.
pub trait PreviewSurface: Send {
    fn open(&mut self, title: &str) -> Result<()>;

    /// Render one frame.
    fn show(&mut self, buffer: &PixelBuffer) -> Result<()>;

    /// Wait up to `wait` for a key press.
    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>>;

    fn close(&mut self) -> Result<()>;
}

/// Surface used when this build has no windowing support.
pub struct UnavailableSurface;

impl PreviewSurface for UnavailableSurface {
    fn open(&mut self, _title: &str) -> Result<()> {
        Err(RelayError::SinkUnavailable {
            sink: "preview".to_string(),
            reason: "built without the window feature".to_string(),
        })
    }

    fn show(&mut self, _buffer: &PixelBuffer) -> Result<()> {
        Ok(())
    }

    fn poll_key(&mut self, _wait: Duration) -> Result<Option<Key>> {
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The preview surface for this build.
pub fn surface_for_build() -> Box<dyn PreviewSurface> {
    #[cfg(all(target_os = "linux", feature = "window"))]
    {
        Box::new(super::window::WindowSurface::new())
    }
    #[cfg(not(all(target_os = "linux", feature = "window")))]
    {
        Box::new(UnavailableSurface)
    }
}

/// Sink rendering frames to a preview surface.
///
/// Each push renders the frame and then polls the surface for one key, so
/// quit requests reach the pipeline through the push result.
pub struct PreviewSink {
    name: String,
    config: PreviewSinkConfig,
    surface: Box<dyn PreviewSurface>,
    open: bool,
}

impl PreviewSink {
    pub fn new(config: PreviewSinkConfig, surface: Box<dyn PreviewSurface>) -> Self {
        Self {
            name: SinkDescriptor::Preview(config.clone()).to_string(),
            config,
            surface,
            open: false,
        }
    }

    pub fn from_config(config: PreviewSinkConfig) -> Self {
        Self::new(config, surface_for_build())
    }

    fn as_push_error(&self, err: RelayError) -> RelayError {
        match err {
            RelayError::SinkFailed { .. } => err,
            other => RelayError::SinkFailed {
                sink: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }
}

impl Sink for PreviewSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        vec![PixelFormat::Bgr8, PixelFormat::Rgb8]
    }

    fn open(&mut self, _format: &OutputFormat) -> Result<()> {
        if self.open {
            return Ok(());
        }
        self.surface.open(&self.config.title).map_err(|e| match e {
            RelayError::SinkUnavailable { .. } => e,
            other => RelayError::SinkUnavailable {
                sink: self.name.clone(),
                reason: other.to_string(),
            },
        })?;
        self.open = true;
        Ok(())
    }

    fn push(&mut self, buffer: &PixelBuffer) -> Result<PushOutcome> {
        if !self.open {
            return Err(RelayError::SinkFailed {
                sink: self.name.clone(),
                reason: "not open".to_string(),
            });
        }
        if let Err(e) = self.surface.show(buffer) {
            return Err(self.as_push_error(e));
        }
        let key = match self.surface.poll_key(KEY_POLL_WAIT) {
            Ok(key) => key,
            Err(e) => return Err(self.as_push_error(e)),
        };
        if let Some(key) = key {
            debug!("{}: key {key:?}", self.name);
        }
        Ok(PushOutcome { key })
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.surface.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::MockPreviewSurface;
    use crate::testing::CallLog;

    fn format() -> OutputFormat {
        OutputFormat {
            pixel_format: PixelFormat::Bgr8,
            size: None,
        }
    }

    fn frame() -> PixelBuffer {
        PixelBuffer::new(2, 1, PixelFormat::Bgr8, vec![0; 6]).unwrap()
    }

    #[test]
    fn prefers_bgr() {
        let sink = PreviewSink::new(
            PreviewSinkConfig::default(),
            Box::new(MockPreviewSurface::new("win", &CallLog::new())),
        );
        assert_eq!(sink.supported_formats()[0], PixelFormat::Bgr8);
    }

    #[test]
    fn push_returns_polled_key_with_short_wait() {
        let log = CallLog::new();
        let surface = MockPreviewSurface::new("win", &log).with_key_after(2, Key::Char('q'));
        let waits = surface.poll_waits();
        let mut sink = PreviewSink::new(PreviewSinkConfig::default(), Box::new(surface));
        sink.open(&format()).unwrap();

        assert_eq!(sink.push(&frame()).unwrap().key, None);
        let outcome = sink.push(&frame()).unwrap();
        assert!(outcome.quit_requested());
        assert_eq!(waits.lock().as_slice(), &[KEY_POLL_WAIT, KEY_POLL_WAIT]);
    }

    #[test]
    fn non_quit_keys_are_reported_but_not_quit() {
        let log = CallLog::new();
        let surface = MockPreviewSurface::new("win", &log).with_key_after(1, Key::Char('x'));
        let mut sink = PreviewSink::new(PreviewSinkConfig::default(), Box::new(surface));
        sink.open(&format()).unwrap();
        let outcome = sink.push(&frame()).unwrap();
        assert_eq!(outcome.key, Some(Key::Char('x')));
        assert!(!outcome.quit_requested());
    }

    #[test]
    fn show_failure_is_a_sink_failure() {
        let log = CallLog::new();
        let surface = MockPreviewSurface::new("win", &log).failing_show_from(1);
        let mut sink = PreviewSink::new(PreviewSinkConfig::default(), Box::new(surface));
        sink.open(&format()).unwrap();
        assert!(matches!(
            sink.push(&frame()),
            Err(RelayError::SinkFailed { .. })
        ));
    }

    #[test]
    fn open_failure_is_unavailable() {
        let log = CallLog::new();
        let surface = MockPreviewSurface::new("win", &log).failing_open("no display");
        let mut sink = PreviewSink::new(PreviewSinkConfig::default(), Box::new(surface));
        assert!(matches!(
            sink.open(&format()),
            Err(RelayError::SinkUnavailable { .. })
        ));
    }

    #[test]
    fn close_runs_once() {
        let log = CallLog::new();
        let mut sink = PreviewSink::new(
            PreviewSinkConfig::default(),
            Box::new(MockPreviewSurface::new("win", &log)),
        );
        sink.open(&format()).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(log.closes("win"), 1);
    }

    #[test]
    fn unavailable_surface_fails_open() {
        let mut surface = UnavailableSurface;
        assert!(surface.open("x").is_err());
    }
}
