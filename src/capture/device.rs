use std::fmt;
use std::time::Duration;

use crate::convert::PixelFormat;
use crate::error::Result;

/// Opaque ownership token for an open physical device.
///
/// Issued by [`CaptureDevice::open`] and handed back on every later call.
/// For the Canon SDK it is the index of the camera in the SDK's list; for the
/// mocks it is a counter.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub usize);

/// Which stream of the device a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Low-latency viewfinder stream (often compressed).
    Preview,
    /// Full sensor readout.
    FullCapture,
}

/// Byte layout the device declares for its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLayout {
    Bgr8,
    Rgb8,
    /// Not a raw pixel layout; the payload must be decoded first.
    Undetermined,
}

impl SourceLayout {
    /// The canonical pixel format this layout maps to without decoding.
    pub fn pixel_format(self) -> Option<PixelFormat> {
        match self {
            Self::Bgr8 => Some(PixelFormat::Bgr8),
            Self::Rgb8 => Some(PixelFormat::Rgb8),
            Self::Undetermined => None,
        }
    }
}

impl From<PixelFormat> for SourceLayout {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Bgr8 => Self::Bgr8,
            PixelFormat::Rgb8 => Self::Rgb8,
        }
    }
}

impl fmt::Display for SourceLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bgr8 => "BGR8",
            Self::Rgb8 => "RGB8",
            Self::Undetermined => "undetermined",
        };
        f.write_str(name)
    }
}

/// The capture format the device actually granted.
///
/// Width and height are zero when the device cannot know them up front (for
/// example a JPEG preview stream whose size is only known after decoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActualFormat {
    pub stream: StreamKind,
    pub layout: SourceLayout,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
}

impl ActualFormat {
    /// Nominal frame size, if the device reported one.
    pub fn size(&self) -> Option<(u32, u32)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }
}

/// One frame as delivered by the device. Lives for a single loop iteration.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stream: StreamKind,
    pub layout: SourceLayout,
    /// Significant bits per sample. Samples wider than 8 bits occupy two
    /// little-endian bytes.
    pub bit_depth: u8,
    /// Device-side frame counter.
    pub sequence: u64,
}

/// Driver-level contract of a physical capture device.
///
/// Implemented by the Canon live view device, the synthetic test pattern and
/// the scriptable mock. Only [`CaptureSource`](super::source::CaptureSource)
/// calls these methods; it owns the handle and the lifecycle ordering.
pub trait CaptureDevice: Send {
    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    /// Acquire exclusive access to the device.
    ///
    /// Fails with `DeviceUnavailable` when nothing is enumerable and
    /// `DeviceBusy` when the device is held elsewhere.
    fn open(&mut self) -> Result<CaptureHandle>;

    /// Negotiate the capture format. The device may grant something other
    /// than `requested`.
    fn configure_format(
        &mut self,
        handle: &CaptureHandle,
        requested: PixelFormat,
    ) -> Result<ActualFormat>;

    /// Begin producing frames.
    fn start(&mut self, handle: &CaptureHandle) -> Result<()>;

    /// Block up to `timeout` for the latest frame.
    ///
    /// Returns `CaptureTimeout` when nothing arrived and `CaptureFailed` on a
    /// hard device error.
    fn retrieve_next_frame(&mut self, handle: &CaptureHandle, timeout: Duration)
        -> Result<RawFrame>;

    /// Stop producing frames.
    fn stop(&mut self, handle: &CaptureHandle) -> Result<()>;

    /// Release the device. Consumes the handle.
    fn close(&mut self, handle: CaptureHandle) -> Result<()>;
}
