//! V4L2 probe capture via the `v4l` crate.

use crate::frame::{self, PixelFormat};
use image::DynamicImage;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;
use vigil_core::{CancelFlag, CaptureError, ProbeSource};

/// Fraction of near-black pixels above which a frame is skipped.
const DARK_THRESHOLD: f32 = 0.95;

/// Non-warmup frames read before giving up on finding a usable one.
const MAX_FRAMES: usize = 30;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Live camera as a probe source.
///
/// Each capture opens a fresh stream, drops `warmup_frames` frames and returns
/// the first frame that is not dark. The cancel flag is checked between frames.
pub struct CameraSource {
    device: Device,
    device_path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    warmup_frames: usize,
    cancel: CancelFlag,
}

impl CameraSource {
    /// Open a V4L2 device (e.g. "/dev/video0") and negotiate a grayscale-capable format.
    pub fn open(device_path: &str, warmup_frames: usize, cancel: CancelFlag) -> Result<Self, CaptureError> {
        if !Path::new(device_path).exists() {
            return Err(CaptureError::Unavailable(format!("{device_path}: no such device")));
        }

        let device = Device::with_path(device_path)
            .map_err(|e| CaptureError::Unavailable(format!("{device_path}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::Unavailable(format!("{device_path}: cannot query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::Unavailable(format!("{device_path}: not a capture device")));
        }

        let mut fmt = device
            .format()
            .map_err(|e| CaptureError::Unavailable(format!("{device_path}: cannot get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 480;

        // Drivers may substitute GREY or Y16 (IR sensors); accept those too.
        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CaptureError::Unavailable(format!("{device_path}: cannot set format: {e}")))?;
        let format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
            CaptureError::Unavailable(format!(
                "{device_path}: unsupported pixel format {:?} (need YUYV, GREY or Y16)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            ?format,
            "camera opened"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            format,
            warmup_frames,
            cancel,
        })
    }
}

impl ProbeSource for CameraSource {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CaptureError::Failed(format!("cannot start stream: {e}")))?;

        let mut dark = 0usize;
        for index in 0..self.warmup_frames + MAX_FRAMES {
            if self.cancel.is_cancelled() {
                tracing::info!(device = %self.device_path, "capture cancelled");
                return Err(CaptureError::Cancelled);
            }

            let (buf, meta) = stream
                .next()
                .map_err(|e| CaptureError::Failed(format!("cannot dequeue buffer: {e}")))?;

            if index < self.warmup_frames {
                continue;
            }

            let gray = frame::decode(self.format, buf, self.width, self.height)
                .map_err(|e| CaptureError::Failed(e.to_string()))?;

            if frame::is_dark(&gray, DARK_THRESHOLD) {
                dark += 1;
                tracing::debug!(seq = meta.sequence, "skipping dark frame");
                continue;
            }

            tracing::debug!(seq = meta.sequence, dark, "probe frame captured");
            return Ok(DynamicImage::ImageLuma8(gray));
        }

        Err(CaptureError::Failed(format!(
            "no usable frame from {} after {MAX_FRAMES} frames ({dark} dark)",
            self.device_path
        )))
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    (0..16)
        .filter_map(|i| {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                return None;
            }
            let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
            caps.capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                .then(|| DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let result = CameraSource::open("/dev/vigil-does-not-exist", 0, CancelFlag::new());
        assert!(matches!(result, Err(CaptureError::Unavailable(_))));
    }
}
