//! `CaptureSource`: owns the physical device's open/close lifecycle.
//!
//! Wraps a boxed [`CaptureDevice`] and the [`CaptureHandle`] it issued. The
//! handle never leaves this type, and once `close()` has run the device is
//! never touched again.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::convert::PixelFormat;
use crate::error::{RelayError, Result};

use super::device::{ActualFormat, CaptureDevice, CaptureHandle, RawFrame};

/// Lifecycle wrapper around a capture device.
pub struct CaptureSource {
    device: Box<dyn CaptureDevice>,
    handle: Option<CaptureHandle>,
    streaming: bool,
    closed: bool,
}

impl CaptureSource {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            handle: None,
            streaming: false,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    /// Whether the device is currently held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquire the device.
    pub fn open(&mut self) -> Result<()> {
        if self.closed {
            return Err(RelayError::CaptureFailed(format!(
                "{} was already released",
                self.device.name()
            )));
        }
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = self.device.open()?;
        info!("opened capture device {}", self.device.name());
        self.handle = Some(handle);
        Ok(())
    }

    /// Negotiate the capture format. Callers must use the returned format.
    pub fn configure_format(&mut self, requested: PixelFormat) -> Result<ActualFormat> {
        let handle = Self::live_handle(&self.handle, self.device.name())?;
        let actual = self.device.configure_format(handle, requested)?;
        if actual.layout.pixel_format() != Some(requested) {
            info!(
                "{} granted {} instead of requested {}",
                self.device.name(),
                actual.layout,
                requested
            );
        }
        Ok(actual)
    }

    /// Start frame production.
    pub fn start(&mut self) -> Result<()> {
        let handle = Self::live_handle(&self.handle, self.device.name())?;
        self.device.start(handle)?;
        self.streaming = true;
        Ok(())
    }

    /// Block up to `timeout` for the next frame.
    pub fn retrieve_frame(&mut self, timeout: Duration) -> Result<RawFrame> {
        let handle = Self::live_handle(&self.handle, self.device.name())?;
        self.device.retrieve_next_frame(handle, timeout)
    }

    /// Stop streaming and release the device. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.streaming {
            self.streaming = false;
            if let Err(e) = self.device.stop(&handle) {
                warn!("failed to stop {}: {e}", self.device.name());
            }
        }
        match self.device.close(handle) {
            Ok(()) => debug!("released capture device {}", self.device.name()),
            Err(e) => warn!("failed to release {}: {e}", self.device.name()),
        }
    }

    fn live_handle<'a>(handle: &'a Option<CaptureHandle>, name: &str) -> Result<&'a CaptureHandle> {
        handle
            .as_ref()
            .ok_or_else(|| RelayError::CaptureFailed(format!("{name} is not open")))
    }
}
