//! vigil-hw — Camera capture for live access attempts.
//!
//! V4L2 devices as cancellable [`vigil_core::ProbeSource`]s, plus raw frame
//! conversion to grayscale.

pub mod camera;
pub mod frame;

pub use camera::{list_devices, CameraSource, DeviceInfo};
pub use frame::{FrameError, PixelFormat};
