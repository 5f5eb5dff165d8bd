use std::time::{Duration, Instant};

use crate::convert::PixelFormat;
use crate::error::{RelayError, Result};

use super::device::{
    ActualFormat, CaptureDevice, CaptureHandle, RawFrame, SourceLayout, StreamKind,
};

const TEST_PATTERN_NAME: &str = "Test Pattern";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_FPS: f64 = 30.0;

/// A synthetic capture device for running the relay without hardware.
///
/// Produces a horizontally scrolling colour gradient at a fixed rate and
/// honours whichever RGB/BGR layout is requested.
///
/// Selected with `--source test-pattern`, or by default when
/// `DUMMY_CAMERA=1` is set.
pub struct TestPatternDevice {
    width: u32,
    height: u32,
    interval: Duration,
    layout: SourceLayout,
    open: bool,
    streaming: bool,
    next_due: Option<Instant>,
    sequence: u64,
}

impl TestPatternDevice {
    pub fn new() -> Self {
        Self::with_mode(DEFAULT_WIDTH, DEFAULT_HEIGHT, DEFAULT_FPS)
    }

    /// Create a pattern of a specific size and rate.
    pub fn with_mode(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            interval: Duration::from_secs_f64(1.0 / fps.max(0.1)),
            layout: SourceLayout::Rgb8,
            open: false,
            streaming: false,
            next_due: None,
            sequence: 0,
        }
    }

    /// Check whether `DUMMY_CAMERA=1` is set.
    pub fn is_enabled() -> bool {
        std::env::var("DUMMY_CAMERA").is_ok_and(|v| v == "1")
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = self.sequence as usize * 4;
        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            let g = ((y * 255) / h.max(1)) as u8;
            for x in 0..w {
                let r = (((x + shift) * 255) / w.max(1) % 256) as u8;
                let b = 255 - r;
                match self.layout {
                    SourceLayout::Bgr8 => data.extend_from_slice(&[b, g, r]),
                    _ => data.extend_from_slice(&[r, g, b]),
                }
            }
        }
        data
    }
}

impl Default for TestPatternDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for TestPatternDevice {
    fn name(&self) -> &str {
        TEST_PATTERN_NAME
    }

    fn open(&mut self) -> Result<CaptureHandle> {
        if self.open {
            return Err(RelayError::DeviceBusy(TEST_PATTERN_NAME.to_string()));
        }
        self.open = true;
        Ok(CaptureHandle(0))
    }

    fn configure_format(
        &mut self,
        _handle: &CaptureHandle,
        requested: PixelFormat,
    ) -> Result<ActualFormat> {
        self.layout = SourceLayout::from(requested);
        Ok(ActualFormat {
            stream: StreamKind::FullCapture,
            layout: self.layout,
            width: self.width,
            height: self.height,
            bit_depth: 8,
        })
    }

    fn start(&mut self, _handle: &CaptureHandle) -> Result<()> {
        self.streaming = true;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn retrieve_next_frame(
        &mut self,
        _handle: &CaptureHandle,
        timeout: Duration,
    ) -> Result<RawFrame> {
        if !self.streaming {
            return Err(RelayError::CaptureFailed(
                "test pattern is not streaming".to_string(),
            ));
        }
        let due = self.next_due.unwrap_or_else(Instant::now);
        let wait = due.saturating_duration_since(Instant::now());
        if wait > timeout {
            std::thread::sleep(timeout);
            return Err(RelayError::CaptureTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        std::thread::sleep(wait);
        self.next_due = Some(due.max(Instant::now() - self.interval) + self.interval);

        self.sequence += 1;
        Ok(RawFrame {
            data: self.render(),
            width: self.width,
            height: self.height,
            stream: StreamKind::FullCapture,
            layout: self.layout,
            bit_depth: 8,
            sequence: self.sequence,
        })
    }

    fn stop(&mut self, _handle: &CaptureHandle) -> Result<()> {
        self.streaming = false;
        self.next_due = None;
        Ok(())
    }

    fn close(&mut self, _handle: CaptureHandle) -> Result<()> {
        self.open = false;
        Ok(())
    }
}
