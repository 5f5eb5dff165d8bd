//! Raw frame to canonical pixel buffer conversion.
//!
//! The converter holds only the negotiated target (pixel format plus the
//! optional output size). Everything else is a pure function of the frame.

pub mod jpeg;
pub mod resize;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capture::RawFrame;
use crate::error::{RelayError, Result};

/// Canonical interleaved 8-bit pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub const fn channels(self) -> usize {
        3
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb8 => f.write_str("RGB8"),
            Self::Bgr8 => f.write_str("BGR8"),
        }
    }
}

/// A decoded frame in a canonical layout.
///
/// `data.len() == width * height * format.channels()` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = buffer_len(width, height, format);
        if data.len() != expected {
            return Err(RelayError::UnsupportedFormat(format!(
                "{width}x{height} {format} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row-major interleaved bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// What the converter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    pub format: PixelFormat,
    /// Output size; `None` keeps each frame's native size.
    pub size: Option<(u32, u32)>,
}

/// Maps device frames onto the negotiated canonical format.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    target: FrameTarget,
}

impl FrameConverter {
    pub fn new(target: FrameTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> FrameTarget {
        self.target
    }

    /// Convert one raw frame.
    ///
    /// Compressed previews are decoded first. Decode failures yield
    /// `DecodeFailed`; layouts or depths that cannot be mapped yield
    /// `UnsupportedFormat`. Both only cost the current frame.
    pub fn convert(&self, raw: RawFrame) -> Result<PixelBuffer> {
        let format = self.target.format;
        let buffer = match raw.layout.pixel_format() {
            None => jpeg::decode(&raw.data, format)?,
            Some(source_format) => {
                let mut data = normalize_depth(raw.data, raw.bit_depth)?;
                let expected = buffer_len(raw.width, raw.height, source_format);
                if data.len() != expected {
                    return Err(RelayError::UnsupportedFormat(format!(
                        "{} frame {}x{} carries {} bytes, expected {expected}",
                        raw.layout,
                        raw.width,
                        raw.height,
                        data.len()
                    )));
                }
                if source_format != format {
                    swap_red_blue(&mut data);
                }
                PixelBuffer::new(raw.width, raw.height, format, data)?
            }
        };

        match self.target.size {
            Some((w, h)) if (w, h) != (buffer.width, buffer.height) => {
                resize::resize(&buffer, w, h)
            }
            _ => Ok(buffer),
        }
    }
}

fn buffer_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.channels()
}

/// Reduce samples to 8 bits, keeping the most significant bits.
///
/// Depths above 8 are stored as 2-byte little-endian samples. Samples above
/// the declared depth saturate at full scale.
fn normalize_depth(data: Vec<u8>, bit_depth: u8) -> Result<Vec<u8>> {
    match bit_depth {
        8 => Ok(data),
        1..=7 => {
            let shift = 8 - bit_depth;
            let max = u8::MAX >> shift;
            Ok(data.into_iter().map(|s| s.min(max) << shift).collect())
        }
        9..=16 => {
            if data.len() % 2 != 0 {
                return Err(RelayError::UnsupportedFormat(format!(
                    "{bit_depth}-bit frame has an odd byte count"
                )));
            }
            let shift = bit_depth - 8;
            let max = u16::MAX >> (16 - bit_depth);
            Ok(data
                .chunks_exact(2)
                .map(|s| (u16::from_le_bytes([s[0], s[1]]).min(max) >> shift) as u8)
                .collect())
        }
        other => Err(RelayError::UnsupportedFormat(format!(
            "{other}-bit samples"
        ))),
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SourceLayout, StreamKind};

    fn raw(layout: SourceLayout, width: u32, height: u32, data: Vec<u8>) -> RawFrame {
        RawFrame {
            data,
            width,
            height,
            stream: StreamKind::FullCapture,
            layout,
            bit_depth: 8,
            sequence: 1,
        }
    }

    fn native(format: PixelFormat) -> FrameConverter {
        FrameConverter::new(FrameTarget { format, size: None })
    }

    #[test]
    fn same_layout_passes_bytes_through() {
        let data: Vec<u8> = (0..24).collect();
        let out = native(PixelFormat::Rgb8)
            .convert(raw(SourceLayout::Rgb8, 4, 2, data.clone()))
            .unwrap();
        assert_eq!(out.data(), data.as_slice());
        assert_eq!(out.format(), PixelFormat::Rgb8);
        assert_eq!((out.width(), out.height()), (4, 2));
    }

    #[test]
    fn bgr_to_rgb_swaps_red_and_blue() {
        let out = native(PixelFormat::Rgb8)
            .convert(raw(SourceLayout::Bgr8, 2, 1, vec![1, 2, 3, 4, 5, 6]))
            .unwrap();
        assert_eq!(out.data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn twelve_bit_samples_keep_the_top_byte() {
        let mut frame = raw(SourceLayout::Rgb8, 1, 1, Vec::new());
        frame.bit_depth = 12;
        for sample in [0x0FFFu16, 0x0800, 0x0010] {
            frame.data.extend_from_slice(&sample.to_le_bytes());
        }
        let out = native(PixelFormat::Rgb8).convert(frame).unwrap();
        assert_eq!(out.data(), &[0xFF, 0x80, 0x01]);
    }

    #[test]
    fn over_range_samples_saturate() {
        let mut frame = raw(SourceLayout::Rgb8, 1, 1, Vec::new());
        frame.bit_depth = 12;
        for sample in [0x1000u16, 0xFFFF, 0x0FFF] {
            frame.data.extend_from_slice(&sample.to_le_bytes());
        }
        let out = native(PixelFormat::Rgb8).convert(frame).unwrap();
        assert_eq!(out.data(), &[0xFF, 0xFF, 0xFF]);

        let mut frame = raw(SourceLayout::Rgb8, 1, 1, vec![0x40, 0xFF, 0x3F]);
        frame.bit_depth = 6;
        let out = native(PixelFormat::Rgb8).convert(frame).unwrap();
        assert_eq!(out.data(), &[0xFC, 0xFC, 0xFC]);
    }

    #[test]
    fn low_depth_samples_are_msb_aligned() {
        let mut frame = raw(SourceLayout::Rgb8, 1, 1, vec![0x3F, 0x20, 0x01]);
        frame.bit_depth = 6;
        let out = native(PixelFormat::Rgb8).convert(frame).unwrap();
        assert_eq!(out.data(), &[0xFC, 0x80, 0x04]);
    }

    #[test]
    fn unsupported_depth_is_rejected() {
        let mut frame = raw(SourceLayout::Rgb8, 1, 1, vec![0; 3]);
        frame.bit_depth = 32;
        assert!(matches!(
            native(PixelFormat::Rgb8).convert(frame),
            Err(RelayError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = native(PixelFormat::Rgb8)
            .convert(raw(SourceLayout::Rgb8, 4, 4, vec![0; 10]))
            .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedFormat(_)));
    }

    #[test]
    fn undetermined_non_jpeg_is_unsupported() {
        let err = native(PixelFormat::Bgr8)
            .convert(raw(SourceLayout::Undetermined, 0, 0, vec![1, 2, 3, 4]))
            .unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_jpeg_is_a_decode_failure() {
        let frame = raw(
            SourceLayout::Undetermined,
            0,
            0,
            vec![0xFF, 0xD8, 0x00, 0x13, 0x37, 0xFF, 0xD9],
        );
        let err = native(PixelFormat::Bgr8).convert(frame).unwrap_err();
        assert!(matches!(err, RelayError::DecodeFailed(_)));
        assert!(err.is_frame_recoverable());
    }

    #[test]
    fn output_is_resized_to_target() {
        let converter = FrameConverter::new(FrameTarget {
            format: PixelFormat::Rgb8,
            size: Some((2, 1)),
        });
        let out = converter
            .convert(raw(SourceLayout::Rgb8, 4, 2, vec![100; 24]))
            .unwrap();
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(out.data().len(), 6);
    }

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        assert!(PixelBuffer::new(2, 2, PixelFormat::Bgr8, vec![0; 11]).is_err());
        assert!(PixelBuffer::new(2, 2, PixelFormat::Bgr8, vec![0; 12]).is_ok());
    }

    #[test]
    fn pixel_format_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PixelFormat::Bgr8).unwrap(), "\"bgr8\"");
    }
}
