//! Position smoothing — sliding-window mean over recent face boxes.
//!
//! Raw per-frame boxes jitter; overlays rendered from them shake visibly.
//! Averaging the last N boxes trades a little positional lag for a steady
//! overlay. The window resets whenever detection is lost.

use crate::types::FaceBox;
use std::collections::VecDeque;

/// Sliding-window smoother over detected face boxes.
pub struct BoxSmoother {
    window: VecDeque<FaceBox>,
    capacity: usize,
}

impl BoxSmoother {
    /// Create a smoother averaging up to `capacity` boxes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Add a raw detection and return the current smoothed position.
    pub fn push(&mut self, face: FaceBox) -> FaceBox {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(face);
        // Window is non-empty here, so average always exists.
        self.average().unwrap_or(face)
    }

    /// Coordinate-wise arithmetic mean of the window, if non-empty.
    pub fn average(&self) -> Option<FaceBox> {
        if self.window.is_empty() {
            return None;
        }
        let n = self.window.len() as f32;
        let mut sum = FaceBox {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        };
        for b in &self.window {
            sum.x += b.x;
            sum.y += b.y;
            sum.width += b.width;
            sum.height += b.height;
        }
        Some(FaceBox {
            x: sum.x / n,
            y: sum.y / n,
            width: sum.width / n,
            height: sum.height / n,
        })
    }

    /// Drop all retained boxes (called when the face is lost).
    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
