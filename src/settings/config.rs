//! Resolution of CLI flags and the settings file into one immutable
//! [`RelayConfig`].

use std::time::Duration;

use anyhow::{bail, Result};

use crate::sink::pacing::MIN_FPS;
use crate::sink::{PreviewSinkConfig, SinkDescriptor, VirtualSinkConfig};

use super::cli::CliArgs;
use super::types::{SettingsFile, SourceKind};

/// Default time to wait for one frame.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5000;

/// Everything the pipeline needs, fixed before it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub source: SourceKind,
    pub capture_timeout: Duration,
    pub sinks: Vec<SinkDescriptor>,
}

impl TryFrom<CliArgs> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => SettingsFile::load(path)?,
            None => SettingsFile::default(),
        };
        Self::resolve(&args, file)
    }
}

impl RelayConfig {
    /// Merge `args` over `file` and validate the result.
    pub fn resolve(args: &CliArgs, file: SettingsFile) -> Result<Self> {
        let source = args.source.or(file.source).unwrap_or_default();
        let timeout_ms = args
            .capture_timeout_ms
            .or(file.capture_timeout_ms)
            .unwrap_or(DEFAULT_CAPTURE_TIMEOUT_MS);

        let sinks = if args.selects_sinks() {
            sinks_from_switches(args, &file, args.preview, args.virtual_output)
        } else if !file.sinks.is_empty() {
            file.sinks
                .iter()
                .cloned()
                .map(|descriptor| apply_overrides(descriptor, args))
                .collect()
        } else {
            sinks_from_switches(
                args,
                &file,
                file.preview.unwrap_or(false),
                file.virtual_output.unwrap_or(false),
            )
        };

        let config = Self {
            source,
            capture_timeout: Duration::from_millis(timeout_ms),
            sinks,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sinks.is_empty() {
            bail!("no outputs configured; pass --preview and/or --virtual-output");
        }
        if self.capture_timeout.is_zero() {
            bail!("--capture-timeout-ms must be greater than zero");
        }

        let mut output_size: Option<(u32, u32)> = None;
        for descriptor in &self.sinks {
            let SinkDescriptor::Virtual(config) = descriptor else {
                continue;
            };
            if !(config.fps.is_finite() && config.fps > 0.0) {
                bail!("--fps must be a positive number, got {}", config.fps);
            }
            if config.fps < MIN_FPS {
                bail!("--fps must be at least {MIN_FPS}, got {}", config.fps);
            }
            if config.device.trim().is_empty() {
                bail!("--device must not be empty");
            }
            let size = match (config.width, config.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
                (None, None) => None,
                (Some(_), Some(_)) => bail!("--width and --height must be greater than zero"),
                (Some(_), None) | (None, Some(_)) => {
                    bail!("--width and --height must be given together")
                }
            };
            match (output_size, size) {
                (Some(a), Some(b)) if a != b => bail!(
                    "virtual outputs disagree on size: {}x{} vs {}x{}",
                    a.0,
                    a.1,
                    b.0,
                    b.1
                ),
                (None, Some(b)) => output_size = Some(b),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Virtual output first, then preview.
fn sinks_from_switches(
    args: &CliArgs,
    file: &SettingsFile,
    preview: bool,
    virtual_output: bool,
) -> Vec<SinkDescriptor> {
    let mut sinks = Vec::new();
    if virtual_output {
        let defaults = VirtualSinkConfig::default();
        sinks.push(SinkDescriptor::Virtual(VirtualSinkConfig {
            width: args.width.or(file.width),
            height: args.height.or(file.height),
            fps: args.fps.or(file.fps).unwrap_or(defaults.fps),
            backend: args.backend.or(file.backend).unwrap_or(defaults.backend),
            device: args
                .device
                .clone()
                .or_else(|| file.device.clone())
                .unwrap_or(defaults.device),
        }));
    }
    if preview {
        sinks.push(SinkDescriptor::Preview(PreviewSinkConfig {
            title: args
                .title
                .clone()
                .or_else(|| file.title.clone())
                .unwrap_or_else(|| PreviewSinkConfig::default().title),
        }));
    }
    sinks
}

fn apply_overrides(descriptor: SinkDescriptor, args: &CliArgs) -> SinkDescriptor {
    match descriptor {
        SinkDescriptor::Virtual(mut config) => {
            if args.width.is_some() || args.height.is_some() {
                config.width = args.width;
                config.height = args.height;
            }
            if let Some(fps) = args.fps {
                config.fps = fps;
            }
            if let Some(backend) = args.backend {
                config.backend = backend;
            }
            if let Some(device) = &args.device {
                config.device = device.clone();
            }
            SinkDescriptor::Virtual(config)
        }
        SinkDescriptor::Preview(mut config) => {
            if let Some(title) = &args.title {
                config.title = title.clone();
            }
            SinkDescriptor::Preview(config)
        }
    }
}
