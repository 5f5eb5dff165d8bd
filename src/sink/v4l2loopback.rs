//! v4l2loopback virtual camera backend (Linux).
//!
//! Configures the loopback node as a video output with the negotiated
//! layout (`RGB3` or `BGR3`) and writes raw row-major frames to it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::debug;
use v4l::capability::Flags;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};

use super::virtual_device::{BackendKind, VirtualCameraBackend, VirtualCameraHandle};

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Rgb8 => FourCC::new(b"RGB3"),
        PixelFormat::Bgr8 => FourCC::new(b"BGR3"),
    }
}

/// Backend writing to a `/dev/videoN` loopback node.
pub struct V4l2LoopbackBackend;

impl VirtualCameraBackend for V4l2LoopbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::V4l2Loopback
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        vec![PixelFormat::Rgb8, PixelFormat::Bgr8]
    }

    fn open(
        &mut self,
        device: &str,
        size: (u32, u32),
        format: PixelFormat,
        fps: f64,
    ) -> Result<Box<dyn VirtualCameraHandle>> {
        let unavailable = |reason: String| RelayError::SinkUnavailable {
            sink: device.to_string(),
            reason,
        };

        if !Path::new(device).exists() {
            return Err(unavailable("device path does not exist".to_string()));
        }
        let dev = Device::with_path(device).map_err(|e| unavailable(e.to_string()))?;
        let caps = dev.query_caps().map_err(|e| unavailable(e.to_string()))?;
        if !caps.capabilities.contains(Flags::VIDEO_OUTPUT) {
            return Err(unavailable(format!(
                "{} ({}) is not a video output device",
                caps.card, caps.driver
            )));
        }

        let wanted = Format::new(size.0, size.1, fourcc(format));
        let granted = Output::set_format(&dev, &wanted)
            .map_err(|e| unavailable(format!("device rejected {format}: {e}")))?;
        if granted.fourcc != wanted.fourcc
            || granted.width != wanted.width
            || granted.height != wanted.height
        {
            return Err(unavailable(format!(
                "device is configured as {}x{} {} (in use by another writer?)",
                granted.width, granted.height, granted.fourcc
            )));
        }

        let writer = OpenOptions::new()
            .write(true)
            .open(device)
            .map_err(|e| unavailable(e.to_string()))?;
        debug!("{device}: {} {}x{} at {fps} fps", caps.card, size.0, size.1);

        Ok(Box::new(V4l2LoopbackHandle {
            device: device.to_string(),
            _dev: dev,
            writer,
            frame_len: size.0 as usize * size.1 as usize * format.channels(),
        }))
    }
}

struct V4l2LoopbackHandle {
    device: String,
    _dev: Device,
    writer: File,
    frame_len: usize,
}

impl VirtualCameraHandle for V4l2LoopbackHandle {
    fn device(&self) -> &str {
        &self.device
    }

    fn send(&mut self, buffer: &PixelBuffer) -> Result<()> {
        let data = buffer.data();
        if data.len() != self.frame_len {
            return Err(RelayError::SinkFailed {
                sink: self.device.clone(),
                reason: format!("frame is {} bytes, device expects {}", data.len(), self.frame_len),
            });
        }
        self.writer
            .write_all(data)
            .map_err(|e| RelayError::SinkFailed {
                sink: self.device.clone(),
                reason: e.to_string(),
            })
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!("releasing {}", self.device);
        Ok(())
    }
}
