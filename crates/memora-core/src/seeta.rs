//! SeetaFace frontal detector via the `rustface` crate.
//!
//! Pure-Rust CPU detection; the model is a single binary file loaded once
//! and reused across camera switches (re-loading is comparatively expensive,
//! a fresh sliding-window detector per frame is not).

use crate::detector::{DetectorError, FaceDetector};
use crate::types::FaceBox;
use std::path::{Path, PathBuf};

const MIN_FACE_SIZE: u32 = 40;
const SCORE_THRESHOLD: f64 = 2.0;
const PYRAMID_SCALE_FACTOR: f32 = 0.8;
const SLIDE_WINDOW_STEP: u32 = 4;

/// Face detector backed by the SeetaFace frontal model.
pub struct SeetaDetector {
    model: rustface::Model,
}

impl std::fmt::Debug for SeetaDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeetaDetector").finish_non_exhaustive()
    }
}

impl SeetaDetector {
    /// Load the SeetaFace model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::Init(format!(
                "model file not found: {} — download seeta_fd_frontal_v1.0.bin and place it there",
                model_path.display()
            )));
        }

        let data = std::fs::read(model_path)
            .map_err(|e| DetectorError::Init(format!("{}: {e}", model_path.display())))?;
        let model = rustface::read_model(std::io::Cursor::new(data))
            .map_err(|e| DetectorError::Init(e.to_string()))?;

        tracing::info!(path = %model_path.display(), "SeetaFace detector loaded");
        Ok(Self { model })
    }
}

impl FaceDetector for SeetaDetector {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<FaceBox>, DetectorError> {
        let expected = (width * height) as usize;
        if gray.len() < expected {
            return Err(DetectorError::Frame(format!(
                "grayscale buffer too short: expected {expected}, got {}",
                gray.len()
            )));
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(PYRAMID_SCALE_FACTOR);
        detector.set_slide_window_step(SLIDE_WINDOW_STEP, SLIDE_WINDOW_STEP);

        let image = rustface::ImageData::new(&gray[..expected], width, height);
        let faces = detector.detect(&image);

        // The UI tracks a single subject; the highest-scoring face wins.
        let best = faces.iter().max_by(|a, b| {
            a.score()
                .partial_cmp(&b.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(best.map(|face| {
            let bbox = face.bbox();
            FaceBox {
                x: bbox.x() as f32,
                y: bbox.y() as f32,
                width: bbox.width() as f32,
                height: bbox.height() as f32,
            }
        }))
    }
}

/// Default location of the SeetaFace model file
/// (`$XDG_DATA_HOME/memora/seeta_fd_frontal_v1.0.bin`).
pub fn default_model_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("memora")
        .join("seeta_fd_frontal_v1.0.bin")
}
