//! Scaling to the canonical output size.

use fast_image_resize as fr;
use fr::images::Image;

use crate::error::{RelayError, Result};

use super::PixelBuffer;

/// Resize an interleaved 3-channel buffer, keeping its pixel format.
///
/// Uses `fast_image_resize` (SIMD where available). Channel order does not
/// matter to the filter, so RGB and BGR share one path.
pub fn resize(buffer: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    if width == 0 || height == 0 {
        return Err(RelayError::UnsupportedFormat(format!(
            "cannot resize to {width}x{height}"
        )));
    }

    let src = Image::from_vec_u8(
        buffer.width(),
        buffer.height(),
        buffer.data().to_vec(),
        fr::PixelType::U8x3,
    )
    .map_err(|e| RelayError::UnsupportedFormat(format!("resize source: {e}")))?;
    let mut dst = Image::new(width, height, fr::PixelType::U8x3);

    fr::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| RelayError::UnsupportedFormat(format!("resize: {e}")))?;

    PixelBuffer::new(width, height, buffer.format(), dst.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::PixelFormat;

    fn make_test_rgb(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
                data.push(128);
            }
        }
        data
    }

    #[test]
    fn downscales_1080p_to_720p() {
        let src = PixelBuffer::new(1920, 1080, PixelFormat::Rgb8, make_test_rgb(1920, 1080))
            .unwrap();
        let out = resize(&src, 1280, 720).unwrap();
        assert_eq!((out.width(), out.height()), (1280, 720));
        assert_eq!(out.data().len(), 1280 * 720 * 3);
        assert_eq!(out.format(), PixelFormat::Rgb8);
    }

    #[test]
    fn keeps_bgr_format() {
        let src = PixelBuffer::new(8, 8, PixelFormat::Bgr8, vec![77; 8 * 8 * 3]).unwrap();
        let out = resize(&src, 16, 4).unwrap();
        assert_eq!(out.format(), PixelFormat::Bgr8);
        assert!(out.data().iter().all(|&b| (76..=78).contains(&b)));
    }

    #[test]
    fn zero_target_is_rejected() {
        let src = PixelBuffer::new(2, 2, PixelFormat::Rgb8, vec![0; 12]).unwrap();
        assert!(resize(&src, 0, 10).is_err());
    }
}
