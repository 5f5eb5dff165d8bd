//! Recording sinks, backends and surfaces for testing without devices.
//!
//! Each mock records its lifecycle into a shared [`CallLog`] and exposes a
//! cloneable probe for inspecting what it was opened with after it has been
//! boxed and handed to a pipeline.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};
use crate::testing::{Call, CallLog};

use super::preview::PreviewSurface;
use super::virtual_device::{BackendKind, VirtualCameraBackend, VirtualCameraHandle};
use super::{Key, OutputFormat, PushOutcome, Sink};

/// What a mock observed, shared with the test.
#[derive(Debug, Default)]
struct Observed {
    opened_with: Option<OutputFormat>,
    opened_size: Option<(u32, u32)>,
    frames: Vec<(u32, u32, PixelFormat)>,
}

/// Read side of a mock's observations.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    observed: Arc<Mutex<Observed>>,
}

impl MockProbe {
    /// Format passed to `open`, if it ran.
    pub fn opened_with(&self) -> Option<OutputFormat> {
        self.observed.lock().opened_with
    }

    /// Size a virtual backend was opened with.
    pub fn opened_size(&self) -> Option<(u32, u32)> {
        self.observed.lock().opened_size
    }

    /// Size and format of every frame received.
    pub fn frames(&self) -> Vec<(u32, u32, PixelFormat)> {
        self.observed.lock().frames.clone()
    }

    fn record_frame(&self, buffer: &PixelBuffer) {
        self.observed
            .lock()
            .frames
            .push((buffer.width(), buffer.height(), buffer.format()));
    }
}

/// Generic scriptable sink.
pub struct MockSink {
    name: String,
    log: CallLog,
    probe: MockProbe,
    formats: Vec<PixelFormat>,
    required_size: Option<(u32, u32)>,
    open_error: Option<String>,
    fail_push_from: Option<usize>,
    quit_on_push: Option<usize>,
    close_error: Option<String>,
    pushes: usize,
}

impl MockSink {
    /// A sink accepting RGB8 then BGR8 that succeeds at everything.
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            probe: MockProbe::default(),
            formats: vec![PixelFormat::Rgb8, PixelFormat::Bgr8],
            required_size: None,
            open_error: None,
            fail_push_from: None,
            quit_on_push: None,
            close_error: None,
            pushes: 0,
        }
    }

    pub fn accepting(mut self, formats: &[PixelFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn requiring_size(mut self, width: u32, height: u32) -> Self {
        self.required_size = Some((width, height));
        self
    }

    /// Make `open` fail with `SinkUnavailable`.
    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    /// Fail every push from the `n`th (1-based) onwards.
    pub fn failing_push_from(mut self, n: usize) -> Self {
        self.fail_push_from = Some(n);
        self
    }

    /// Report the `q` key on the `n`th (1-based) push.
    pub fn quitting_on_push(mut self, n: usize) -> Self {
        self.quit_on_push = Some(n);
        self
    }

    pub fn failing_close(mut self, reason: &str) -> Self {
        self.close_error = Some(reason.to_string());
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Sink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        self.formats.clone()
    }

    fn required_size(&self) -> Option<(u32, u32)> {
        self.required_size
    }

    fn open(&mut self, format: &OutputFormat) -> Result<()> {
        if let Some(reason) = &self.open_error {
            return Err(RelayError::SinkUnavailable {
                sink: self.name.clone(),
                reason: reason.clone(),
            });
        }
        self.log.record(Call::Open(self.name.clone()));
        self.probe.observed.lock().opened_with = Some(*format);
        Ok(())
    }

    fn push(&mut self, buffer: &PixelBuffer) -> Result<PushOutcome> {
        self.pushes += 1;
        self.log.record(Call::Push(self.name.clone()));
        if self.fail_push_from.is_some_and(|n| self.pushes >= n) {
            return Err(RelayError::SinkFailed {
                sink: self.name.clone(),
                reason: format!("scripted failure on push {}", self.pushes),
            });
        }
        self.probe.record_frame(buffer);
        if self.quit_on_push == Some(self.pushes) {
            return Ok(PushOutcome::key(Key::Char('q')));
        }
        Ok(PushOutcome::default())
    }

    fn close(&mut self) -> Result<()> {
        self.log.record(Call::Close(self.name.clone()));
        match &self.close_error {
            Some(reason) => Err(RelayError::SinkFailed {
                sink: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Virtual camera backend that records instead of writing to a device.
pub struct MockVirtualBackend {
    name: String,
    log: CallLog,
    probe: MockProbe,
    formats: Vec<PixelFormat>,
    open_error: Option<String>,
}

impl MockVirtualBackend {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            probe: MockProbe::default(),
            formats: vec![PixelFormat::Rgb8, PixelFormat::Bgr8],
            open_error: None,
        }
    }

    pub fn accepting(mut self, formats: &[PixelFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Make `open` fail as if the device were busy or missing.
    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl VirtualCameraBackend for MockVirtualBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::V4l2Loopback
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        self.formats.clone()
    }

    fn open(
        &mut self,
        device: &str,
        size: (u32, u32),
        format: PixelFormat,
        _fps: f64,
    ) -> Result<Box<dyn VirtualCameraHandle>> {
        if let Some(reason) = &self.open_error {
            return Err(RelayError::SinkUnavailable {
                sink: device.to_string(),
                reason: reason.clone(),
            });
        }
        self.log.record(Call::Open(self.name.clone()));
        {
            let mut observed = self.probe.observed.lock();
            observed.opened_size = Some(size);
            observed.opened_with = Some(OutputFormat {
                pixel_format: format,
                size: Some(size),
            });
        }
        Ok(Box::new(MockVirtualHandle {
            name: self.name.clone(),
            device: device.to_string(),
            log: self.log.clone(),
            probe: self.probe.clone(),
        }))
    }
}

struct MockVirtualHandle {
    name: String,
    device: String,
    log: CallLog,
    probe: MockProbe,
}

impl VirtualCameraHandle for MockVirtualHandle {
    fn device(&self) -> &str {
        &self.device
    }

    fn send(&mut self, buffer: &PixelBuffer) -> Result<()> {
        self.log.record(Call::Push(self.name.clone()));
        self.probe.record_frame(buffer);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.log.record(Call::Close(self.name.clone()));
        Ok(())
    }
}

/// Preview surface that records frames and replays scripted keys.
pub struct MockPreviewSurface {
    name: String,
    log: CallLog,
    probe: MockProbe,
    open_error: Option<String>,
    fail_show_from: Option<usize>,
    keys: Vec<(usize, Key)>,
    shown: usize,
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl MockPreviewSurface {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            probe: MockProbe::default(),
            open_error: None,
            fail_show_from: None,
            keys: Vec::new(),
            shown: 0,
            waits: Arc::default(),
        }
    }

    /// Report `key` on the poll following the `n`th (1-based) frame.
    pub fn with_key_after(mut self, n: usize, key: Key) -> Self {
        self.keys.push((n, key));
        self
    }

    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    /// Fail every `show` from the `n`th (1-based) onwards.
    pub fn failing_show_from(mut self, n: usize) -> Self {
        self.fail_show_from = Some(n);
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    /// Wait durations passed to `poll_key`, shared with the test.
    pub fn poll_waits(&self) -> Arc<Mutex<Vec<Duration>>> {
        Arc::clone(&self.waits)
    }
}

impl PreviewSurface for MockPreviewSurface {
    fn open(&mut self, _title: &str) -> Result<()> {
        if let Some(reason) = &self.open_error {
            return Err(RelayError::SinkUnavailable {
                sink: self.name.clone(),
                reason: reason.clone(),
            });
        }
        self.log.record(Call::Open(self.name.clone()));
        Ok(())
    }

    fn show(&mut self, buffer: &PixelBuffer) -> Result<()> {
        self.shown += 1;
        self.log.record(Call::Push(self.name.clone()));
        if self.fail_show_from.is_some_and(|n| self.shown >= n) {
            return Err(RelayError::SinkFailed {
                sink: self.name.clone(),
                reason: "window lost".to_string(),
            });
        }
        self.probe.record_frame(buffer);
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>> {
        self.waits.lock().push(wait);
        let shown = self.shown;
        Ok(self
            .keys
            .iter()
            .find(|(n, _)| *n == shown)
            .map(|(_, key)| *key))
    }

    fn close(&mut self) -> Result<()> {
        self.log.record(Call::Close(self.name.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> PixelBuffer {
        PixelBuffer::new(1, 1, PixelFormat::Rgb8, vec![1, 2, 3]).unwrap()
    }

    #[test]
    fn mock_sink_scripts_quit_and_failure() {
        let log = CallLog::new();
        let mut sink = MockSink::new("s", &log).quitting_on_push(2).failing_push_from(3);
        assert!(!sink.push(&frame()).unwrap().quit_requested());
        assert!(sink.push(&frame()).unwrap().quit_requested());
        assert!(sink.push(&frame()).is_err());
        assert_eq!(log.pushes("s"), 3);
        assert_eq!(sink.probe().frames().len(), 2);
    }

    #[test]
    fn mock_sink_open_failure_records_nothing() {
        let log = CallLog::new();
        let mut sink = MockSink::new("s", &log).failing_open("busy");
        let format = OutputFormat {
            pixel_format: PixelFormat::Rgb8,
            size: None,
        };
        assert!(sink.open(&format).is_err());
        assert_eq!(log.opens("s"), 0);
        assert_eq!(sink.probe().opened_with(), None);
    }

    #[test]
    fn preview_surface_replays_keys_after_frames() {
        let log = CallLog::new();
        let mut surface = MockPreviewSurface::new("win", &log).with_key_after(1, Key::Escape);
        assert_eq!(surface.poll_key(Duration::ZERO).unwrap(), None);
        surface.show(&frame()).unwrap();
        assert_eq!(surface.poll_key(Duration::ZERO).unwrap(), Some(Key::Escape));
    }

    #[test]
    fn mocks_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MockSink>();
        assert_send::<MockVirtualBackend>();
        assert_send::<MockPreviewSurface>();
    }
}
