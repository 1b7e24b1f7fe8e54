//! Camera frame source interface.
//!
//! The controller owns its source exclusively while active — only one poll
//! loop may be attached to a given stream at a time.

use crate::types::FacingMode;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    /// Permission denied or no usable device. Terminal until manual retry.
    #[error("camera access failed: {0}")]
    Access(String),
    /// A single frame could not be read. Treated as "no face this tick".
    #[error("frame capture failed: {0}")]
    Frame(String),
}

/// A frame ready for detection: grayscale at intrinsic video resolution.
pub struct VideoFrame {
    pub gray: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Full-resolution JPEG grabbed at the moment of a stability-threshold
/// crossing (not the downscaled detection frame).
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedPhoto {
    /// Raw base64 of the JPEG bytes, the form the recognition webhook expects.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }

    /// `data:image/jpeg;base64,…` form for UI consumers.
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }
}

/// Exclusive handle on a live camera stream.
pub trait FrameSource: Send {
    /// Next frame for detection. `Ok(None)` means the stream is not yet
    /// producing decodable frames; the caller skips the tick without
    /// resetting any counters.
    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, SourceError>;

    /// Grab and JPEG-encode a full-resolution frame.
    fn capture_photo(&mut self) -> Result<CapturedPhoto, SourceError>;

    /// Tear down the current stream and reacquire one for `facing`.
    /// Position continuity across a switch is not attempted.
    fn switch(&mut self, facing: FacingMode) -> Result<(), SourceError>;

    /// Intrinsic resolution of the active stream.
    fn resolution(&self) -> (u32, u32);

    /// Stop all tracks and release the stream. Idempotent.
    fn shutdown(&mut self);
}
