use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box for a detected face.
///
/// Coordinates are in video pixels as produced by the detector; callers that
/// render an overlay at a different size rescale via [`FaceBox::to_display`].
/// Boxes carry no identity across frames — continuity is inferred by the
/// smoothing and stability logic, not by the data model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    /// Scale all four coordinates by independent X/Y factors.
    pub fn scaled(&self, sx: f32, sy: f32) -> FaceBox {
        FaceBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// Rescale from intrinsic video resolution to a rendered display size.
    pub fn to_display(&self, video: (u32, u32), display: (u32, u32)) -> FaceBox {
        if video.0 == 0 || video.1 == 0 {
            return *self;
        }
        self.scaled(
            display.0 as f32 / video.0 as f32,
            display.1 as f32 / video.1 as f32,
        )
    }
}

/// State of the capture controller. Exactly one value is current at any
/// time; transitions are reported via [`crate::TrackerEvent::StatusChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Camera or detector not yet ready.
    #[default]
    Loading,
    /// Polling; no face found, or a face found but not yet stable.
    Detecting,
    /// A face has been in the same approximate region for consecutive polls.
    Stable,
    /// A frame was grabbed and handed off; polling is suspended until resumed.
    Capturing,
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackingStatus::Loading => "loading",
            TrackingStatus::Detecting => "detecting",
            TrackingStatus::Stable => "stable",
            TrackingStatus::Capturing => "capturing",
        };
        f.write_str(s)
    }
}

/// Which camera to acquire: the user-facing front camera or the
/// environment-facing rear camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    User,
    Environment,
}

impl FacingMode {
    pub fn opposite(&self) -> FacingMode {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}
