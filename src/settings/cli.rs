//! Command line flags.
//!
//! Every knob is optional here so that an unset flag falls back to the
//! settings file before the built-in default.

use std::path::PathBuf;

use clap::Parser;

use crate::sink::BackendKind;

use super::types::SourceKind;

/// Relay live camera frames to a virtual camera and/or a preview window.
#[derive(Debug, Default, Parser)]
#[command(name = "camrelay", version, about)]
pub struct CliArgs {
    /// Show frames in a preview window (quit with q or Esc).
    #[arg(long)]
    pub preview: bool,

    /// Write frames to a virtual camera device.
    #[arg(long = "virtual-output")]
    pub virtual_output: bool,

    /// Virtual camera backend: v4l2loopback, obs or unitycapture [default: v4l2loopback].
    #[arg(long, value_name = "NAME")]
    pub backend: Option<BackendKind>,

    /// Virtual camera device [default: /dev/video21].
    #[arg(long, value_name = "PATH")]
    pub device: Option<String>,

    /// Output width in pixels (requires --height).
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Output height in pixels (requires --width).
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Virtual camera frame rate [default: 10].
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f64>,

    /// Preview window title [default: camrelay].
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Frame source: canon or test-pattern [default: test-pattern].
    #[arg(long, value_name = "SOURCE")]
    pub source: Option<SourceKind>,

    /// How long to wait for each frame before skipping it [default: 5000].
    #[arg(long = "capture-timeout-ms", value_name = "MS")]
    pub capture_timeout_ms: Option<u64>,

    /// JSON settings file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Whether the command line defines the sink list.
    pub fn selects_sinks(&self) -> bool {
        self.preview || self.virtual_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "camrelay",
            "--preview",
            "--virtual-output",
            "--backend",
            "OBS",
            "--device",
            "/dev/video3",
            "--width",
            "640",
            "--height",
            "480",
            "--fps",
            "15",
            "--title",
            "cam",
            "--source",
            "canon",
            "--capture-timeout-ms",
            "250",
            "-v",
        ])
        .unwrap();
        assert!(args.preview && args.virtual_output && args.verbose);
        assert_eq!(args.backend, Some(BackendKind::Obs));
        assert_eq!(args.device.as_deref(), Some("/dev/video3"));
        assert_eq!((args.width, args.height), (Some(640), Some(480)));
        assert_eq!(args.fps, Some(15.0));
        assert_eq!(args.source, Some(SourceKind::Canon));
        assert_eq!(args.capture_timeout_ms, Some(250));
    }

    #[test]
    fn unset_flags_stay_unset() {
        let args = CliArgs::try_parse_from(["camrelay"]).unwrap();
        assert!(!args.selects_sinks());
        assert_eq!(args.backend, None);
        assert_eq!(args.fps, None);
        assert_eq!(args.config, None);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(CliArgs::try_parse_from(["camrelay", "--backend", "dshow"]).is_err());
    }

    #[test]
    fn rejects_unknown_source() {
        assert!(CliArgs::try_parse_from(["camrelay", "--source", "webcam"]).is_err());
    }
}
