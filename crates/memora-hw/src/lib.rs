//! memora-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access with facing-mode device mapping,
//! YUYV conversion, and JPEG encoding of captured frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceMap};
