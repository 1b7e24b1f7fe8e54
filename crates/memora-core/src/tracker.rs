//! Stability state machine.
//!
//! Pure tick logic, no I/O: feed it one detection result per poll and it
//! decides when the face has held still long enough to capture. The poll
//! loop in [`crate::controller`] drives it and turns its updates into
//! events.

use crate::smoothing::BoxSmoother;
use crate::types::{FaceBox, TrackingStatus};

/// Outcome of observing one detection poll.
#[derive(Debug, Clone, PartialEq)]
pub struct TickUpdate {
    /// Smoothed position, or `None` when no face was found. Reported on
    /// every tick regardless of pause state.
    pub position: Option<FaceBox>,
    /// Status transition produced by this tick, before any capture
    /// (`Stable` on the first count, `Detecting` on loss). `None` when the
    /// status did not change.
    pub status_change: Option<TrackingStatus>,
    /// A stability-threshold crossing: the caller must grab a frame and
    /// emit a capture event. The status has already moved to `Capturing`
    /// and the counter is reset, so at most one capture fires per crossing.
    pub capture: bool,
}

impl TickUpdate {
    fn quiet(position: Option<FaceBox>) -> Self {
        Self {
            position,
            status_change: None,
            capture: false,
        }
    }
}

/// Counts consecutive detections and decides when to capture.
pub struct StabilityTracker {
    threshold: u32,
    count: u32,
    status: TrackingStatus,
    paused: bool,
    smoother: BoxSmoother,
}

impl StabilityTracker {
    /// New tracker in `Loading` state with the given stability threshold
    /// (minimum 1) and smoothing window size.
    pub fn new(threshold: u32, smoothing_window: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            count: 0,
            status: TrackingStatus::Loading,
            paused: false,
            smoother: BoxSmoother::new(smoothing_window),
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn stable_count(&self) -> u32 {
        self.count
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stream attached and detector ready: `Loading` → `Detecting`.
    pub fn mark_ready(&mut self) -> Option<TrackingStatus> {
        if self.status == TrackingStatus::Loading {
            self.status = TrackingStatus::Detecting;
            Some(self.status)
        } else {
            None
        }
    }

    /// Observe one detection poll.
    ///
    /// While paused, positions keep flowing but the counter is frozen and no
    /// capture can fire. While `Capturing`, polling is expected to be
    /// suspended by the caller; a stray observation is ignored.
    pub fn observe(&mut self, detection: Option<FaceBox>) -> TickUpdate {
        if self.status == TrackingStatus::Capturing {
            return TickUpdate::quiet(None);
        }

        match detection {
            Some(raw) => {
                let position = self.smoother.push(raw);
                if self.paused {
                    return TickUpdate::quiet(Some(position));
                }

                self.count += 1;
                let status_change = if self.count == 1 && self.status != TrackingStatus::Stable {
                    self.status = TrackingStatus::Stable;
                    Some(TrackingStatus::Stable)
                } else {
                    None
                };

                if self.count >= self.threshold {
                    self.count = 0;
                    self.status = TrackingStatus::Capturing;
                    return TickUpdate {
                        position: Some(position),
                        status_change,
                        capture: true,
                    };
                }

                TickUpdate {
                    position: Some(position),
                    status_change,
                    capture: false,
                }
            }
            None => {
                // The window resets on loss even while paused; a stale mean
                // must not reappear when the face comes back.
                self.smoother.clear();
                if self.paused {
                    return TickUpdate::quiet(None);
                }

                self.count = 0;
                let status_change = if self.status != TrackingStatus::Detecting {
                    self.status = TrackingStatus::Detecting;
                    Some(TrackingStatus::Detecting)
                } else {
                    None
                };
                TickUpdate {
                    position: None,
                    status_change,
                    capture: false,
                }
            }
        }
    }

    /// Update the pause flag. Unpausing resets the counter (a fresh run
    /// starts) and, when mid-capture, also resumes polling.
    pub fn set_paused(&mut self, paused: bool) -> Option<TrackingStatus> {
        self.paused = paused;
        if paused {
            return None;
        }
        self.count = 0;
        if self.status == TrackingStatus::Capturing {
            return self.resume();
        }
        None
    }

    /// Return from `Capturing` to `Detecting` so a new run can begin.
    pub fn resume(&mut self) -> Option<TrackingStatus> {
        self.count = 0;
        self.smoother.clear();
        if self.status == TrackingStatus::Capturing {
            self.status = TrackingStatus::Detecting;
            Some(self.status)
        } else {
            None
        }
    }

    /// Reset after a camera switch: position and counter are dropped, the
    /// status machine returns to `Detecting` once the new stream attaches.
    pub fn reset_run(&mut self) -> Option<TrackingStatus> {
        self.count = 0;
        self.smoother.clear();
        if self.status != TrackingStatus::Detecting && self.status != TrackingStatus::Loading {
            self.status = TrackingStatus::Detecting;
            Some(self.status)
        } else {
            None
        }
    }
}
