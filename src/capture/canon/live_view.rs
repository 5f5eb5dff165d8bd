//! Canon live view as a capture device.
//!
//! Live view frames are JPEG previews pulled with `download_evf_image`.
//! A retrieve polls until a frame is ready or the caller's timeout runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::capture::device::{
    ActualFormat, CaptureDevice, CaptureHandle, RawFrame, SourceLayout, StreamKind,
};
use crate::convert::PixelFormat;
use crate::error::{RelayError, Result};

use super::api::{CameraHandle, EdsSdkApi, SdkError};

/// Default pause between "not ready" polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Capture device backed by a Canon EOS camera's electronic viewfinder.
pub struct CanonCapture<S: EdsSdkApi> {
    sdk: Arc<S>,
    name: String,
    camera: Option<CameraHandle>,
    poll_interval: Duration,
    sequence: u64,
}

impl<S: EdsSdkApi> CanonCapture<S> {
    pub fn new(sdk: Arc<S>) -> Self {
        Self::with_poll_interval(sdk, DEFAULT_POLL_INTERVAL)
    }

    /// Use a custom polling interval (useful for testing).
    pub fn with_poll_interval(sdk: Arc<S>, poll_interval: Duration) -> Self {
        Self {
            sdk,
            name: "Canon camera".to_string(),
            camera: None,
            poll_interval,
            sequence: 0,
        }
    }

    fn camera(&self, handle: &CaptureHandle) -> Result<CameraHandle> {
        match self.camera {
            Some(camera) if camera.0 == handle.0 => Ok(camera),
            _ => Err(RelayError::CaptureFailed(format!(
                "{} has no open session for handle {}",
                self.name, handle.0
            ))),
        }
    }
}

fn capture_failed(err: SdkError) -> RelayError {
    RelayError::CaptureFailed(err.to_string())
}

impl<S: EdsSdkApi> CaptureDevice for CanonCapture<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<CaptureHandle> {
        let cameras = self
            .sdk
            .camera_list()
            .map_err(|e| RelayError::DeviceUnavailable(e.to_string()))?;
        let Some(&camera) = cameras.first() else {
            return Err(RelayError::DeviceUnavailable(
                "no Canon camera detected".to_string(),
            ));
        };

        self.sdk.open_session(camera).map_err(|e| {
            if e.is_busy() {
                RelayError::DeviceBusy(e.to_string())
            } else {
                RelayError::DeviceUnavailable(e.to_string())
            }
        })?;

        match self.sdk.get_device_info(camera) {
            Ok(info) => self.name = info.model_name(),
            Err(e) => debug!("could not read device info: {e}"),
        }
        info!("opened session with {}", self.name);
        self.camera = Some(camera);
        Ok(CaptureHandle(camera.0))
    }

    fn configure_format(
        &mut self,
        handle: &CaptureHandle,
        requested: PixelFormat,
    ) -> Result<ActualFormat> {
        let camera = self.camera(handle)?;
        let (width, height) = match self.sdk.live_view_size(camera) {
            Ok(size) if size.width > 0 && size.height > 0 => {
                (size.width as u32, size.height as u32)
            }
            Ok(_) => (0, 0),
            Err(e) => {
                debug!("live view size unknown until the first frame: {e}");
                (0, 0)
            }
        };
        debug!("{} streams JPEG previews; decoding to {requested}", self.name);
        Ok(ActualFormat {
            stream: StreamKind::Preview,
            layout: SourceLayout::Undetermined,
            width,
            height,
            bit_depth: 8,
        })
    }

    fn start(&mut self, handle: &CaptureHandle) -> Result<()> {
        let camera = self.camera(handle)?;
        self.sdk.start_live_view(camera).map_err(capture_failed)
    }

    fn retrieve_next_frame(
        &mut self,
        handle: &CaptureHandle,
        timeout: Duration,
    ) -> Result<RawFrame> {
        let camera = self.camera(handle)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Err(e) = self.sdk.get_event() {
                debug!("EdsGetEvent: {e}");
            }
            match self.sdk.download_evf_image(camera) {
                Ok(data) => {
                    self.sequence += 1;
                    return Ok(RawFrame {
                        data,
                        width: 0,
                        height: 0,
                        stream: StreamKind::Preview,
                        layout: SourceLayout::Undetermined,
                        bit_depth: 8,
                        sequence: self.sequence,
                    });
                }
                Err(e) if e.is_not_ready() => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RelayError::CaptureTimeout {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(self.poll_interval.min(deadline - now));
                }
                Err(e) => return Err(capture_failed(e)),
            }
        }
    }

    fn stop(&mut self, handle: &CaptureHandle) -> Result<()> {
        let camera = self.camera(handle)?;
        self.sdk.stop_live_view(camera).map_err(capture_failed)
    }

    fn close(&mut self, handle: CaptureHandle) -> Result<()> {
        let camera = self.camera(&handle)?;
        self.camera = None;
        self.sdk.close_session(camera).map_err(capture_failed)
    }
}
