//! Decoding of compressed preview payloads.

use crate::error::{RelayError, Result};

use super::{PixelBuffer, PixelFormat};

const SOI: [u8; 2] = [0xFF, 0xD8];

/// Whether the payload starts with a JPEG start-of-image marker.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&SOI)
}

/// Decode a JPEG payload straight into the requested layout.
pub fn decode(data: &[u8], format: PixelFormat) -> Result<PixelBuffer> {
    if !is_jpeg(data) {
        return Err(RelayError::UnsupportedFormat(
            "undetermined payload is not a JPEG stream".to_string(),
        ));
    }

    let tj_format = match format {
        PixelFormat::Rgb8 => turbojpeg::PixelFormat::RGB,
        PixelFormat::Bgr8 => turbojpeg::PixelFormat::BGR,
    };
    let image = turbojpeg::decompress(data, tj_format)
        .map_err(|e| RelayError::DecodeFailed(e.to_string()))?;

    let row = image.width * format.channels();
    let pixels = if image.pitch == row {
        image.pixels
    } else {
        image
            .pixels
            .chunks(image.pitch)
            .take(image.height)
            .flat_map(|line| line.iter().take(row).copied())
            .collect()
    };

    PixelBuffer::new(image.width as u32, image.height as u32, format, pixels)
}
