//! V4L2 camera capture via the `v4l` crate.
//!
//! Maps the caller-facing camera selector (`user` / `environment`) onto
//! device paths and implements [`FrameSource`] for the capture controller.

use crate::frame;
use memora_core::source::{CapturedPhoto, FrameSource, SourceError, VideoFrame};
use memora_core::types::FacingMode;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Proportion of near-black pixels above which a frame is treated as not
/// yet decodable (stream warmup).
const BLANK_THRESHOLD_PCT: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

impl From<CameraError> for SourceError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::CaptureFailed(msg) => SourceError::Frame(msg),
            other => SourceError::Access(other.to_string()),
        }
    }
}

/// Maps facing modes onto V4L2 device paths. Linux exposes no facing
/// metadata, so the mapping is configuration.
#[derive(Debug, Clone)]
pub struct DeviceMap {
    /// `user` — the camera looking at the patient.
    pub front: String,
    /// `environment` — the camera looking at the visitor.
    pub rear: String,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self {
            front: "/dev/video0".to_string(),
            rear: "/dev/video2".to_string(),
        }
    }
}

impl DeviceMap {
    pub fn path_for(&self, facing: FacingMode) -> &str {
        match facing {
            FacingMode::User => &self.front,
            FacingMode::Environment => &self.rear,
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 camera handle, exclusively owned by one capture controller while
/// active.
pub struct Camera {
    device: Option<Device>,
    map: DeviceMap,
    width: u32,
    height: u32,
    device_path: String,
    jpeg_quality: u8,
    warmup_frames: u32,
    warmup_remaining: u32,
    /// Most recent raw YUYV buffer; the photo at capture time comes from
    /// the same frame that crossed the stability threshold.
    last_yuyv: Option<Vec<u8>>,
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("device_path", &self.device_path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("warmup_frames", &self.warmup_frames)
            .field("warmup_remaining", &self.warmup_remaining)
            .finish_non_exhaustive()
    }
}

impl Camera {
    /// Acquire the camera for the given facing mode.
    ///
    /// `warmup_frames` initial grabs are reported as not-ready so the
    /// sensor's AGC/AE can settle before detection starts.
    pub fn open(
        map: DeviceMap,
        facing: FacingMode,
        jpeg_quality: u8,
        warmup_frames: u32,
    ) -> Result<Self, CameraError> {
        let path = map.path_for(facing).to_string();
        let (device, width, height) = open_device(&path)?;
        Ok(Self {
            device: Some(device),
            map,
            width,
            height,
            device_path: path,
            jpeg_quality,
            warmup_frames,
            warmup_remaining: warmup_frames,
            last_yuyv: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Dequeue one raw YUYV buffer.
    fn grab_raw(&mut self) -> Result<Vec<u8>, CameraError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CameraError::DeviceNotFound("camera stopped".to_string()))?;

        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        Ok(buf.to_vec())
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Open a device and negotiate YUYV at 1280x720 (the driver may settle on
/// a different resolution; whatever it grants is used).
fn open_device(device_path: &str) -> Result<(Device, u32, u32), CameraError> {
    if !Path::new(device_path).exists() {
        return Err(CameraError::DeviceNotFound(device_path.to_string()));
    }

    let device = Device::with_path(device_path).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("busy") || msg.contains("EBUSY") {
            CameraError::DeviceBusy
        } else if msg.contains("Permission denied") || msg.contains("EACCES") {
            CameraError::PermissionDenied(format!("{device_path}: {e}"))
        } else {
            CameraError::DeviceNotFound(format!("{device_path}: {e}"))
        }
    })?;

    let caps = device
        .query_caps()
        .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

    tracing::info!(
        device = device_path,
        driver = %caps.driver,
        card = %caps.card,
        "opened camera"
    );

    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        return Err(CameraError::StreamingNotSupported);
    }

    let mut fmt = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;

    fmt.fourcc = FourCC::new(b"YUYV");
    fmt.width = 1280;
    fmt.height = 720;

    let negotiated = device
        .set_format(&fmt)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

    if negotiated.fourcc != FourCC::new(b"YUYV") {
        return Err(CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format: {:?} (need YUYV)",
            negotiated.fourcc
        )));
    }

    tracing::info!(
        width = negotiated.width,
        height = negotiated.height,
        "negotiated format"
    );

    Ok((device, negotiated.width, negotiated.height))
}

impl FrameSource for Camera {
    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, SourceError> {
        let yuyv = self.grab_raw().map_err(SourceError::from)?;

        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            tracing::debug!(remaining = self.warmup_remaining, "discarding warmup frame");
            return Ok(None);
        }

        let gray = frame::yuyv_to_grayscale(&yuyv, self.width, self.height)
            .map_err(|e| SourceError::Frame(e.to_string()))?;

        if frame::is_blank_frame(&gray, BLANK_THRESHOLD_PCT) {
            tracing::debug!("frame not yet decodable; skipping tick");
            return Ok(None);
        }

        self.last_yuyv = Some(yuyv);
        Ok(Some(VideoFrame {
            gray,
            width: self.width,
            height: self.height,
        }))
    }

    fn capture_photo(&mut self) -> Result<CapturedPhoto, SourceError> {
        let yuyv = match self.last_yuyv.take() {
            Some(buf) => buf,
            None => self.grab_raw().map_err(SourceError::from)?,
        };

        let rgb = frame::yuyv_to_rgb(&yuyv, self.width, self.height)
            .map_err(|e| SourceError::Frame(e.to_string()))?;
        let jpeg = frame::encode_jpeg(&rgb, self.width, self.height, self.jpeg_quality)
            .map_err(|e| SourceError::Frame(e.to_string()))?;

        Ok(CapturedPhoto {
            jpeg,
            width: self.width,
            height: self.height,
        })
    }

    fn switch(&mut self, facing: FacingMode) -> Result<(), SourceError> {
        let path = self.map.path_for(facing).to_string();
        tracing::info!(device = %path, ?facing, "switching camera");

        // Release the old device before opening the new one; front and rear
        // may be the same physical device.
        self.device = None;
        self.last_yuyv = None;

        let (device, width, height) = open_device(&path).map_err(SourceError::from)?;
        self.device = Some(device);
        self.width = width;
        self.height = height;
        self.device_path = path;
        // The fresh stream warms up again.
        self.warmup_remaining = self.warmup_frames;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn shutdown(&mut self) {
        if self.device.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
        self.last_yuyv = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_map_paths() {
        let map = DeviceMap {
            front: "/dev/video0".into(),
            rear: "/dev/video2".into(),
        };
        assert_eq!(map.path_for(FacingMode::User), "/dev/video0");
        assert_eq!(map.path_for(FacingMode::Environment), "/dev/video2");
    }

    #[test]
    fn test_capture_failures_are_transient() {
        let err: SourceError = CameraError::CaptureFailed("dequeue".into()).into();
        assert!(matches!(err, SourceError::Frame(_)));
    }

    #[test]
    fn test_access_failures_are_terminal() {
        for e in [
            CameraError::DeviceNotFound("/dev/video9".into()),
            CameraError::PermissionDenied("/dev/video0".into()),
            CameraError::DeviceBusy,
            CameraError::StreamingNotSupported,
        ] {
            assert!(matches!(SourceError::from(e), SourceError::Access(_)));
        }
    }

    #[test]
    fn test_open_missing_device() {
        let map = DeviceMap {
            front: "/dev/video-nonexistent".into(),
            rear: "/dev/video-nonexistent".into(),
        };
        let err = Camera::open(map, FacingMode::User, 80, 0).unwrap_err();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
