//! Frame consumers: the virtual camera output and the on-screen preview.

pub mod mock;
pub mod pacing;
pub mod preview;
#[cfg(all(target_os = "linux", feature = "v4l2loopback"))]
pub mod v4l2loopback;
pub mod virtual_device;
#[cfg(all(target_os = "linux", feature = "window"))]
pub mod window;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::convert::{PixelBuffer, PixelFormat};
use crate::error::{RelayError, Result};

pub use preview::{PreviewSink, PreviewSurface};
pub use virtual_device::{BackendKind, VirtualCameraBackend, VirtualCameraHandle, VirtualDeviceSink};

/// Default virtual camera device node.
pub const DEFAULT_DEVICE: &str = "/dev/video21";
/// Default virtual camera frame rate.
pub const DEFAULT_FPS: f64 = 10.0;
/// Default preview window title.
pub const DEFAULT_TITLE: &str = "camrelay";

/// Configuration of a virtual camera output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualSinkConfig {
    /// Explicit output size; both or neither.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: f64,
    pub backend: BackendKind,
    pub device: String,
}

impl VirtualSinkConfig {
    pub fn size(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

impl Default for VirtualSinkConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            fps: DEFAULT_FPS,
            backend: BackendKind::default(),
            device: DEFAULT_DEVICE.to_string(),
        }
    }
}

/// Configuration of a preview window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewSinkConfig {
    pub title: String,
}

impl Default for PreviewSinkConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// One configured output. Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SinkDescriptor {
    Virtual(VirtualSinkConfig),
    Preview(PreviewSinkConfig),
}

impl SinkDescriptor {
    /// Output size this descriptor pins, if any.
    pub fn required_size(&self) -> Option<(u32, u32)> {
        match self {
            Self::Virtual(config) => config.size(),
            Self::Preview(_) => None,
        }
    }
}

impl fmt::Display for SinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Virtual(config) => write!(f, "virtual {} ({})", config.device, config.backend),
            Self::Preview(config) => write!(f, "preview '{}'", config.title),
        }
    }
}

/// The negotiated frame format every sink is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub pixel_format: PixelFormat,
    /// Canonical output size, when known before the first frame.
    pub size: Option<(u32, u32)>,
}

/// A key event reported by an interactive sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    /// The window was closed by the user.
    WindowClosed,
}

impl Key {
    /// Whether this key asks the relay to stop.
    pub fn is_quit(self) -> bool {
        matches!(self, Self::Char('q') | Self::Escape | Self::WindowClosed)
    }
}

/// What a sink reports back from one push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub key: Option<Key>,
}

impl PushOutcome {
    pub fn key(key: Key) -> Self {
        Self { key: Some(key) }
    }

    pub fn quit_requested(&self) -> bool {
        self.key.is_some_and(Key::is_quit)
    }
}

/// A frame consumer driven by the pipeline.
///
/// `open` runs once before the first push and `close` once at teardown; the
/// pipeline guarantees neither is repeated. Every buffer pushed has the
/// pixel format given to `open`.
pub trait Sink: Send {
    /// Name for logs and error messages.
    fn name(&self) -> &str;

    /// Pixel formats this sink accepts, most preferred first.
    fn supported_formats(&self) -> Vec<PixelFormat>;

    /// Output size this sink needs every frame to have, if any.
    fn required_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Claim the underlying output.
    fn open(&mut self, format: &OutputFormat) -> Result<()>;

    /// Consume one frame.
    fn push(&mut self, buffer: &PixelBuffer) -> Result<PushOutcome>;

    /// Release the underlying output.
    fn close(&mut self) -> Result<()>;
}

/// Pick the pixel format every sink can accept.
///
/// Walks the first sink's preference list and returns the first format all
/// other sinks also accept.
pub fn negotiate_format(sinks: &[Box<dyn Sink>]) -> Result<PixelFormat> {
    let Some((first, rest)) = sinks.split_first() else {
        return Err(RelayError::Config("no sinks configured".to_string()));
    };
    first
        .supported_formats()
        .into_iter()
        .find(|format| {
            rest.iter()
                .all(|sink| sink.supported_formats().contains(format))
        })
        .ok_or_else(|| {
            let offers = sinks
                .iter()
                .map(|s| format!("{}: {:?}", s.name(), s.supported_formats()))
                .collect::<Vec<_>>()
                .join(", ");
            RelayError::UnsupportedFormat(format!("no pixel format shared by all sinks ({offers})"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::MockSink;
    use crate::testing::CallLog;

    fn sink(name: &str, formats: &[PixelFormat]) -> Box<dyn Sink> {
        Box::new(MockSink::new(name, &CallLog::new()).accepting(formats))
    }

    #[test]
    fn negotiation_follows_first_sink_preference() {
        let sinks = vec![
            sink("preview", &[PixelFormat::Bgr8, PixelFormat::Rgb8]),
            sink("virtual", &[PixelFormat::Rgb8, PixelFormat::Bgr8]),
        ];
        assert_eq!(negotiate_format(&sinks).unwrap(), PixelFormat::Bgr8);
    }

    #[test]
    fn negotiation_skips_formats_not_shared() {
        let sinks = vec![
            sink("preview", &[PixelFormat::Bgr8, PixelFormat::Rgb8]),
            sink("virtual", &[PixelFormat::Rgb8]),
        ];
        assert_eq!(negotiate_format(&sinks).unwrap(), PixelFormat::Rgb8);
    }

    #[test]
    fn negotiation_fails_without_common_format() {
        let sinks = vec![
            sink("a", &[PixelFormat::Bgr8]),
            sink("b", &[PixelFormat::Rgb8]),
        ];
        assert!(matches!(
            negotiate_format(&sinks),
            Err(RelayError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn quit_keys() {
        assert!(Key::Char('q').is_quit());
        assert!(Key::Escape.is_quit());
        assert!(Key::WindowClosed.is_quit());
        assert!(!Key::Char('x').is_quit());
        assert!(PushOutcome::key(Key::Escape).quit_requested());
        assert!(!PushOutcome::default().quit_requested());
    }

    #[test]
    fn descriptors_deserialize_with_defaults() {
        let json = r#"[
            {"kind": "virtual", "width": 1920, "height": 1080, "fps": 20},
            {"kind": "preview"}
        ]"#;
        let sinks: Vec<SinkDescriptor> = serde_json::from_str(json).unwrap();
        match &sinks[0] {
            SinkDescriptor::Virtual(config) => {
                assert_eq!(config.size(), Some((1920, 1080)));
                assert_eq!(config.fps, 20.0);
                assert_eq!(config.device, DEFAULT_DEVICE);
                assert_eq!(config.backend, BackendKind::V4l2Loopback);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            sinks[1],
            SinkDescriptor::Preview(PreviewSinkConfig::default())
        );
    }

    #[test]
    fn descriptor_display_names_the_output() {
        let descriptor = SinkDescriptor::Virtual(VirtualSinkConfig::default());
        assert_eq!(descriptor.to_string(), "virtual /dev/video21 (v4l2loopback)");
    }
}
