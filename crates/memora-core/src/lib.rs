//! memora-core — Face-tracking capture controller.
//!
//! Turns a live camera frame source into (a) a continuous stream of smoothed
//! face positions for overlay rendering and (b) a one-shot "capture now"
//! event with a full-resolution JPEG once a face has held still for a
//! configurable number of consecutive detections.

pub mod controller;
pub mod detector;
pub mod seeta;
pub mod smoothing;
pub mod source;
pub mod tracker;
pub mod types;

pub use controller::{CaptureController, ControllerHandle, TrackerConfig, TrackerError, TrackerEvent};
pub use detector::{DetectorError, FaceDetector};
pub use source::{CapturedPhoto, FrameSource, SourceError, VideoFrame};
pub use types::{FaceBox, FacingMode, TrackingStatus};
