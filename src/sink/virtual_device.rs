//! Virtual camera output.
//!
//! The sink claims a backend device once at open, writes every frame in the
//! negotiated layout and paces itself to the configured frame rate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};

use super::pacing::FramePacer;
use super::{OutputFormat, PushOutcome, Sink, SinkDescriptor, VirtualSinkConfig};

/// Virtual camera backend identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    V4l2Loopback,
    Obs,
    UnityCapture,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::V4l2Loopback, Self::Obs, Self::UnityCapture];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V4l2Loopback => "v4l2loopback",
            Self::Obs => "obs",
            Self::UnityCapture => "unitycapture",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| {
                format!("unknown backend '{s}' (expected v4l2loopback, obs or unitycapture)")
            })
    }
}

/// A claimed virtual camera device.
pub trait VirtualCameraHandle: Send {
    /// The device actually claimed, for logs.
    fn device(&self) -> &str;

    /// Write one frame. The buffer matches the format given at open.
    fn send(&mut self, buffer: &PixelBuffer) -> Result<()>;

    /// Release the device.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A virtual camera implementation (v4l2loopback, OBS, ...).
pub trait VirtualCameraBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Pixel formats the backend accepts, most preferred first.
    fn supported_formats(&self) -> Vec<PixelFormat>;

    /// Claim `device` for frames of the given size and layout.
    ///
    /// Fails with `SinkUnavailable` when the device is missing, busy or
    /// rejects the format.
    fn open(
        &mut self,
        device: &str,
        size: (u32, u32),
        format: PixelFormat,
        fps: f64,
    ) -> Result<Box<dyn VirtualCameraHandle>>;
}

/// A recognised backend that this build or platform cannot provide.
///
/// Opening it fails, which surfaces as a pipeline init failure.
pub struct UnavailableBackend {
    kind: BackendKind,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(kind: BackendKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl VirtualCameraBackend for UnavailableBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        vec![PixelFormat::Rgb8, PixelFormat::Bgr8]
    }

    fn open(
        &mut self,
        _device: &str,
        _size: (u32, u32),
        _format: PixelFormat,
        _fps: f64,
    ) -> Result<Box<dyn VirtualCameraHandle>> {
        Err(RelayError::SinkUnavailable {
            sink: self.kind.to_string(),
            reason: self.reason.clone(),
        })
    }
}

/// The backend implementation for `kind` on this build.
pub fn backend_for(kind: BackendKind) -> Box<dyn VirtualCameraBackend> {
    match kind {
        #[cfg(all(target_os = "linux", feature = "v4l2loopback"))]
        BackendKind::V4l2Loopback => Box::new(super::v4l2loopback::V4l2LoopbackBackend),
        #[cfg(not(all(target_os = "linux", feature = "v4l2loopback")))]
        BackendKind::V4l2Loopback => Box::new(UnavailableBackend::new(
            kind,
            "built without the v4l2loopback feature",
        )),
        BackendKind::Obs | BackendKind::UnityCapture => Box::new(UnavailableBackend::new(
            kind,
            "backend is not supported on this platform",
        )),
    }
}

/// Sink writing frames to a virtual camera at a fixed rate.
pub struct VirtualDeviceSink {
    name: String,
    config: VirtualSinkConfig,
    backend: Box<dyn VirtualCameraBackend>,
    handle: Option<Box<dyn VirtualCameraHandle>>,
    size: Option<(u32, u32)>,
    pacer: FramePacer,
}

impl VirtualDeviceSink {
    pub fn new(config: VirtualSinkConfig, backend: Box<dyn VirtualCameraBackend>) -> Self {
        let name = SinkDescriptor::Virtual(config.clone()).to_string();
        let pacer = FramePacer::new(config.fps);
        Self {
            name,
            config,
            backend,
            handle: None,
            size: None,
            pacer,
        }
    }

    /// Build the sink with the backend named in `config`.
    pub fn from_config(config: VirtualSinkConfig) -> Self {
        let backend = backend_for(config.backend);
        Self::new(config, backend)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn failed(&self, reason: impl Into<String>) -> RelayError {
        RelayError::SinkFailed {
            sink: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl Sink for VirtualDeviceSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        self.backend.supported_formats()
    }

    fn required_size(&self) -> Option<(u32, u32)> {
        self.config.size()
    }

    fn open(&mut self, format: &OutputFormat) -> Result<()> {
        if self.handle.is_some() {
            debug!("{} is already open", self.name);
            return Ok(());
        }
        let unavailable = |reason: String| RelayError::SinkUnavailable {
            sink: self.name.clone(),
            reason,
        };

        let Some(size) = self.config.size().or(format.size) else {
            return Err(unavailable(
                "output size unknown; set an explicit width and height".to_string(),
            ));
        };
        if !self.backend.supported_formats().contains(&format.pixel_format) {
            return Err(unavailable(format!(
                "{} does not accept {}",
                self.backend.kind(),
                format.pixel_format
            )));
        }

        let handle = self.backend.open(
            &self.config.device,
            size,
            format.pixel_format,
            self.config.fps,
        )?;
        info!(
            "virtual camera device: {} ({}x{} {} @ {} fps)",
            handle.device(),
            size.0,
            size.1,
            format.pixel_format,
            self.config.fps
        );
        self.size = Some(size);
        self.handle = Some(handle);
        self.pacer.reset();
        Ok(())
    }

    fn push(&mut self, buffer: &PixelBuffer) -> Result<PushOutcome> {
        let expected = self.size;
        if expected != Some((buffer.width(), buffer.height())) {
            return Err(self.failed(format!(
                "frame is {}x{}, device expects {:?}",
                buffer.width(),
                buffer.height(),
                expected
            )));
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(self.failed("not open"));
        };
        handle.send(buffer)?;
        self.pacer.wait();
        Ok(PushOutcome::default())
    }

    fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                debug!("closing {}", self.name);
                handle.close()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::sink::mock::MockVirtualBackend;
    use crate::testing::CallLog;

    fn config(fps: f64) -> VirtualSinkConfig {
        VirtualSinkConfig {
            width: Some(4),
            height: Some(2),
            fps,
            ..VirtualSinkConfig::default()
        }
    }

    fn rgb_format() -> OutputFormat {
        OutputFormat {
            pixel_format: PixelFormat::Rgb8,
            size: None,
        }
    }

    fn frame(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(
            width,
            height,
            PixelFormat::Rgb8,
            vec![0; (width * height * 3) as usize],
        )
        .unwrap()
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("v4l2loopback".parse::<BackendKind>(), Ok(BackendKind::V4l2Loopback));
        assert_eq!("OBS".parse::<BackendKind>(), Ok(BackendKind::Obs));
        assert_eq!("unitycapture".parse::<BackendKind>(), Ok(BackendKind::UnityCapture));
        assert!("dshow".parse::<BackendKind>().is_err());
    }

    #[test]
    fn unsupported_backend_fails_to_open() {
        let mut sink = VirtualDeviceSink::from_config(VirtualSinkConfig {
            backend: BackendKind::UnityCapture,
            ..config(10.0)
        });
        let err = sink.open(&rgb_format()).unwrap_err();
        assert!(matches!(err, RelayError::SinkUnavailable { .. }), "{err}");
        assert!(!sink.is_open());
    }

    #[test]
    fn opens_backend_once_with_explicit_size() {
        let log = CallLog::new();
        let backend = MockVirtualBackend::new("vcam", &log);
        let probe = backend.probe();
        let mut sink = VirtualDeviceSink::new(config(1000.0), Box::new(backend));

        sink.open(&rgb_format()).unwrap();
        sink.open(&rgb_format()).unwrap();
        for _ in 0..3 {
            sink.push(&frame(4, 2)).unwrap();
        }
        sink.close().unwrap();
        sink.close().unwrap();

        assert_eq!(log.opens("vcam"), 1);
        assert_eq!(log.pushes("vcam"), 3);
        assert_eq!(log.closes("vcam"), 1);
        assert_eq!(probe.opened_size(), Some((4, 2)));
    }

    #[test]
    fn falls_back_to_negotiated_size() {
        let log = CallLog::new();
        let backend = MockVirtualBackend::new("vcam", &log);
        let probe = backend.probe();
        let mut sink = VirtualDeviceSink::new(
            VirtualSinkConfig::default(),
            Box::new(backend),
        );
        sink.open(&OutputFormat {
            pixel_format: PixelFormat::Rgb8,
            size: Some((1280, 720)),
        })
        .unwrap();
        assert_eq!(probe.opened_size(), Some((1280, 720)));
    }

    #[test]
    fn unknown_size_is_unavailable() {
        let log = CallLog::new();
        let mut sink = VirtualDeviceSink::new(
            VirtualSinkConfig::default(),
            Box::new(MockVirtualBackend::new("vcam", &log)),
        );
        assert!(matches!(
            sink.open(&rgb_format()),
            Err(RelayError::SinkUnavailable { .. })
        ));
        assert_eq!(log.opens("vcam"), 0);
    }

    #[test]
    fn rejects_format_backend_does_not_accept() {
        let log = CallLog::new();
        let backend = MockVirtualBackend::new("vcam", &log).accepting(&[PixelFormat::Bgr8]);
        let mut sink = VirtualDeviceSink::new(config(10.0), Box::new(backend));
        assert!(sink.open(&rgb_format()).is_err());
    }

    #[test]
    fn wrong_frame_size_fails_push() {
        let log = CallLog::new();
        let mut sink = VirtualDeviceSink::new(
            config(1000.0),
            Box::new(MockVirtualBackend::new("vcam", &log)),
        );
        sink.open(&rgb_format()).unwrap();
        assert!(matches!(
            sink.push(&frame(8, 8)),
            Err(RelayError::SinkFailed { .. })
        ));
        assert_eq!(log.pushes("vcam"), 0);
    }

    #[test]
    fn push_before_open_fails() {
        let log = CallLog::new();
        let mut sink = VirtualDeviceSink::new(
            config(10.0),
            Box::new(MockVirtualBackend::new("vcam", &log)),
        );
        assert!(sink.push(&frame(4, 2)).is_err());
    }

    #[test]
    fn push_is_paced_to_fps() {
        let log = CallLog::new();
        let mut sink = VirtualDeviceSink::new(
            config(50.0),
            Box::new(MockVirtualBackend::new("vcam", &log)),
        );
        sink.open(&rgb_format()).unwrap();

        let started = Instant::now();
        for _ in 0..6 {
            sink.push(&frame(4, 2)).unwrap();
        }
        let elapsed = started.elapsed();
        // five intervals of 20 ms between six pushes
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    }
}
