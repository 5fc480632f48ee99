//! Raw V4L2 buffers to grayscale images.

use image::GrayImage;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{format:?} buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("invalid frame dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
}

/// Pixel formats the camera may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed; luma is every even byte.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    pub fn from_fourcc(repr: &[u8; 4]) -> Option<Self> {
        match repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Grey => 1,
            Self::Yuyv | Self::Y16 => 2,
        }
    }
}

/// Decode one captured buffer into an 8-bit grayscale image.
///
/// Trailing bytes beyond `width * height` pixels are ignored (drivers pad).
pub fn decode(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<GrayImage, FrameError> {
    let pixels = (width as usize) * (height as usize);
    if pixels == 0 {
        return Err(FrameError::Dimensions { width, height });
    }
    let expected = pixels * format.bytes_per_pixel();
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    let buf = &buf[..expected];

    let luma: Vec<u8> = match format {
        PixelFormat::Grey => buf.to_vec(),
        PixelFormat::Yuyv => buf.iter().step_by(2).copied().collect(),
        // Keep the high byte of each little-endian sample.
        PixelFormat::Y16 => buf.chunks_exact(2).map(|px| px[1]).collect(),
    };

    GrayImage::from_raw(width, height, luma).ok_or(FrameError::Dimensions { width, height })
}

/// True when more than `threshold` of the pixels are below 32.
///
/// Cameras with IR emitters deliver such frames between illuminated ones.
pub fn is_dark(image: &GrayImage, threshold: f32) -> bool {
    let raw = image.as_raw();
    if raw.is_empty() {
        return true;
    }
    let dark = raw.iter().filter(|&&p| p < 32).count();
    (dark as f32 / raw.len() as f32) > threshold
}
