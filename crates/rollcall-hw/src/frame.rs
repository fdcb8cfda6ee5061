//! Raw V4L2 buffer conversion to RGB frames.

use image::RgbImage;

/// Pixel layouts the camera may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes per pixel.
    Yuyv,
    /// 8-bit grayscale, common on IR cameras.
    Grey,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format:?} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Convert a raw buffer in `format` to an RGB frame.
pub fn to_rgb(
    buf: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage, FrameError> {
    match format {
        PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height),
        PixelFormat::Grey => grey_to_rgb(buf, width, height),
    }
}

/// Convert packed YUYV to RGB using BT.601 limited-range coefficients.
///
/// Each 4-byte group `[Y0, U, Y1, V]` encodes two horizontally adjacent
/// pixels sharing chroma.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: PixelFormat::Yuyv,
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for group in yuyv[..expected].chunks_exact(4) {
        let (u, v) = (group[1], group[3]);
        rgb.extend_from_slice(&bt601(group[0], u, v));
        rgb.extend_from_slice(&bt601(group[2], u, v));
    }
    // Odd widths leave a trailing half group.
    rgb.resize(pixels * 3, 0);

    Ok(RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height)))
}

/// Replicate an 8-bit grayscale buffer into all three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            format: PixelFormat::Grey,
            expected: pixels,
            actual: grey.len(),
        });
    }
    let rgb = grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect();
    Ok(RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height)))
}

fn bt601(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}
