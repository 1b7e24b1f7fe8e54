//! Face-detection backend interface.
//!
//! The controller only needs to know *whether* and *where* a face is in a
//! frame; the detection engine itself is a black box behind [`FaceDetector`]
//! so any backend (or a scripted stub in tests) can be substituted without
//! touching the state machine.

use crate::types::FaceBox;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// The detection model could not be fetched or parsed. Blocking: no
    /// detection is possible, surfaced to the caller as a terminal error.
    #[error("detector model failed to load: {0}")]
    Init(String),
    /// A single frame failed to process. Absorbed by the poll loop as
    /// "no face this tick"; never escalated.
    #[error("frame detection failed: {0}")]
    Frame(String),
}

/// Narrow interface over a face-detection engine.
///
/// `detect` is invoked at most once at a time per controller — calls are
/// serialized by the poll loop and never overlap.
pub trait FaceDetector: Send {
    /// Detect the most prominent face in a row-major grayscale buffer of
    /// `width` × `height` bytes. Returns `None` when no face is found.
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceBox>, DetectorError>;
}
