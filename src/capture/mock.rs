//! Scriptable capture device for testing without hardware.
//!
//! Uses a builder to queue frame outcomes (frames, timeouts, corrupt
//! previews, hard failures) and to inject open errors. Lifecycle calls are
//! recorded into a shared [`CallLog`].

use std::collections::VecDeque;
use std::time::Duration;

use crate::convert::PixelFormat;
use crate::error::{RelayError, Result};
use crate::testing::{Call, CallLog};

use super::device::{
    ActualFormat, CaptureDevice, CaptureHandle, RawFrame, SourceLayout, StreamKind,
};

const DEFAULT_WIDTH: u32 = 4;
const DEFAULT_HEIGHT: u32 = 2;

/// One scripted outcome of `retrieve_next_frame`.
#[derive(Debug)]
enum Scripted {
    Frame,
    Raw(RawFrame),
    Timeout,
    CorruptPreview,
    Failure(String),
}

/// Mock capture device.
pub struct MockCaptureDevice {
    name: String,
    log: CallLog,
    script: VecDeque<Scripted>,
    open_error: Option<RelayError>,
    granted: Option<SourceLayout>,
    layout: SourceLayout,
    width: u32,
    height: u32,
    sequence: u64,
    next_handle: usize,
}

impl MockCaptureDevice {
    /// Create a mock with an empty script. An exhausted script reports a
    /// hard capture failure.
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            script: VecDeque::new(),
            open_error: None,
            granted: None,
            layout: SourceLayout::Rgb8,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            sequence: 0,
            next_handle: 0,
        }
    }

    /// Queue `count` valid frames in the negotiated layout.
    pub fn with_frames(mut self, count: usize) -> Self {
        self.script.extend((0..count).map(|_| Scripted::Frame));
        self
    }

    /// Queue a specific raw frame.
    pub fn with_raw_frame(mut self, frame: RawFrame) -> Self {
        self.script.push_back(Scripted::Raw(frame));
        self
    }

    /// Queue `count` timeouts.
    pub fn with_timeouts(mut self, count: usize) -> Self {
        self.script.extend((0..count).map(|_| Scripted::Timeout));
        self
    }

    /// Queue a preview frame whose JPEG payload cannot be decoded.
    pub fn with_corrupt_preview(mut self) -> Self {
        self.script.push_back(Scripted::CorruptPreview);
        self
    }

    /// Queue a hard device error.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.script.push_back(Scripted::Failure(message.to_string()));
        self
    }

    /// Make `open` fail with the given error.
    pub fn with_open_error(mut self, error: RelayError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Grant this layout regardless of what is requested.
    pub fn granting(mut self, layout: SourceLayout) -> Self {
        self.granted = Some(layout);
        self
    }

    /// Frame size for generated frames.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Deterministic pixel payload for the given frame sequence number.
    pub fn frame_bytes(width: u32, height: u32, sequence: u64) -> Vec<u8> {
        let len = width as usize * height as usize * 3;
        (0..len)
            .map(|i| (i as u64).wrapping_add(sequence.wrapping_mul(7)) as u8)
            .collect()
    }

    fn generated_frame(&mut self) -> RawFrame {
        self.sequence += 1;
        RawFrame {
            data: Self::frame_bytes(self.width, self.height, self.sequence),
            width: self.width,
            height: self.height,
            stream: StreamKind::FullCapture,
            layout: self.layout,
            bit_depth: 8,
            sequence: self.sequence,
        }
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<CaptureHandle> {
        if let Some(err) = self.open_error.take() {
            return Err(err);
        }
        self.log.record(Call::Open(self.name.clone()));
        self.next_handle += 1;
        Ok(CaptureHandle(self.next_handle))
    }

    fn configure_format(
        &mut self,
        _handle: &CaptureHandle,
        requested: PixelFormat,
    ) -> Result<ActualFormat> {
        self.layout = self.granted.unwrap_or(SourceLayout::from(requested));
        Ok(ActualFormat {
            stream: StreamKind::FullCapture,
            layout: self.layout,
            width: self.width,
            height: self.height,
            bit_depth: 8,
        })
    }

    fn start(&mut self, _handle: &CaptureHandle) -> Result<()> {
        Ok(())
    }

    fn retrieve_next_frame(
        &mut self,
        _handle: &CaptureHandle,
        timeout: Duration,
    ) -> Result<RawFrame> {
        match self.script.pop_front() {
            Some(Scripted::Frame) => Ok(self.generated_frame()),
            Some(Scripted::Raw(frame)) => Ok(frame),
            Some(Scripted::Timeout) => Err(RelayError::CaptureTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Some(Scripted::CorruptPreview) => {
                self.sequence += 1;
                Ok(RawFrame {
                    data: vec![0xFF, 0xD8, 0x00, 0x13, 0x37, 0xFF, 0xD9],
                    width: 0,
                    height: 0,
                    stream: StreamKind::Preview,
                    layout: SourceLayout::Undetermined,
                    bit_depth: 8,
                    sequence: self.sequence,
                })
            }
            Some(Scripted::Failure(message)) => Err(RelayError::CaptureFailed(message)),
            None => Err(RelayError::CaptureFailed(
                "end of scripted stream".to_string(),
            )),
        }
    }

    fn stop(&mut self, _handle: &CaptureHandle) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _handle: CaptureHandle) -> Result<()> {
        self.log.record(Call::Close(self.name.clone()));
        Ok(())
    }
}
