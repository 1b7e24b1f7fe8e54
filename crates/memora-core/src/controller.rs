//! Capture controller — the poll loop that drives tracking.
//!
//! Runs on a dedicated thread at a fixed cadence. Each tick: poll one
//! frame, run the detector, feed the stability tracker, emit events.
//! Detector calls are serialized — a new one never starts while the
//! previous is outstanding.

use crate::detector::{DetectorError, FaceDetector};
use crate::source::{CapturedPhoto, FrameSource, SourceError};
use crate::tracker::StabilityTracker;
use crate::types::{FaceBox, FacingMode, TrackingStatus};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("camera error: {0}")]
    Camera(#[from] SourceError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Tunables for the poll loop. The defaults mirror the original product
/// behavior: one detection every 200 ms, a capture after five consecutive
/// detections (about one second of stillness), a five-box smoothing window.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum time between detector invocations.
    pub poll_interval: Duration,
    /// Consecutive detections required before a capture fires.
    pub stable_threshold: u32,
    /// Number of recent boxes averaged for overlay positions.
    pub smoothing_window: usize,
    /// Facing mode the source was opened with; flipped on camera switch.
    pub facing: FacingMode,
    /// Rendered overlay size. Boxes are rescaled from intrinsic video
    /// resolution to these dimensions; `None` delivers video coordinates.
    pub display_size: Option<(u32, u32)>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            stable_threshold: 5,
            smoothing_window: 5,
            facing: FacingMode::Environment,
            display_size: None,
        }
    }
}

/// Events delivered to the caller, in tick order, never batched.
#[derive(Debug)]
pub enum TrackerEvent {
    /// Current smoothed position, on every detection tick — including while
    /// paused, so an overlay can stay glued to a moving face.
    FacePosition(Option<FaceBox>),
    /// Fired only when the status actually changes.
    StatusChanged(TrackingStatus),
    /// Fired exactly once per stability-threshold crossing, strictly after
    /// the `Stable` transition was observable and immediately before
    /// `StatusChanged(Capturing)`.
    CaptureReady {
        photo: CapturedPhoto,
        face: FaceBox,
    },
    /// The camera failed mid-run. Terminal for this controller; retry by
    /// spawning a new one.
    Error(TrackerError),
}

enum Command {
    SetPaused(bool),
    SwitchCamera,
    Resume,
    Stop,
}

/// Clone-safe handle to the poll thread. All methods are fire-and-forget
/// and harmless after the controller has stopped.
#[derive(Clone)]
pub struct ControllerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Freeze (or thaw) the stability counter while keeping tracking live.
    pub fn set_paused(&self, paused: bool) {
        let _ = self.cmd_tx.send(Command::SetPaused(paused));
    }

    /// Tear down the stream and reacquire the opposite facing mode.
    pub fn switch_camera(&self) {
        let _ = self.cmd_tx.send(Command::SwitchCamera);
    }

    /// Return from `Capturing` to `Detecting` after a result was shown.
    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Resume);
    }

    /// Halt polling and release the camera. Idempotent — safe to call
    /// repeatedly or after the loop has already exited.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }
}

pub struct CaptureController;

impl CaptureController {
    /// Spawn the poll loop on a dedicated thread.
    ///
    /// The source must already be attached and the detector loaded — both
    /// fail at construction, before any polling starts. The first event is
    /// `StatusChanged(Detecting)`.
    pub fn spawn<S, D>(
        source: S,
        detector: D,
        config: TrackerConfig,
    ) -> (ControllerHandle, mpsc::UnboundedReceiver<TrackerEvent>)
    where
        S: FrameSource + 'static,
        D: FaceDetector + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("memora-tracker".into())
            .spawn(move || run_loop(source, detector, config, cmd_rx, event_tx))
            .expect("failed to spawn tracker thread");

        (ControllerHandle { cmd_tx }, event_rx)
    }
}

fn run_loop<S: FrameSource, D: FaceDetector>(
    mut source: S,
    mut detector: D,
    config: TrackerConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TrackerEvent>,
) {
    let mut tracker = StabilityTracker::new(config.stable_threshold, config.smoothing_window);
    let mut facing = config.facing;

    tracing::info!(
        ?facing,
        interval_ms = config.poll_interval.as_millis() as u64,
        threshold = config.stable_threshold,
        window = config.smoothing_window,
        "tracker loop started"
    );

    if let Some(status) = tracker.mark_ready() {
        let _ = events.send(TrackerEvent::StatusChanged(status));
    }

    'outer: loop {
        let tick_start = Instant::now();

        // Apply pending commands between ticks.
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Stop) => break 'outer,
                Ok(Command::SetPaused(paused)) => {
                    if let Some(status) = tracker.set_paused(paused) {
                        let _ = events.send(TrackerEvent::StatusChanged(status));
                    }
                }
                Ok(Command::Resume) => {
                    if let Some(status) = tracker.resume() {
                        let _ = events.send(TrackerEvent::StatusChanged(status));
                    }
                }
                Ok(Command::SwitchCamera) => {
                    facing = facing.opposite();
                    match source.switch(facing) {
                        Ok(()) => {
                            let _ = events.send(TrackerEvent::FacePosition(None));
                            if let Some(status) = tracker.reset_run() {
                                let _ = events.send(TrackerEvent::StatusChanged(status));
                            }
                            tracing::info!(?facing, "camera switched");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "camera switch failed");
                            let _ = events.send(TrackerEvent::Error(e.into()));
                            break 'outer;
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        // While mid-capture, polling for new detections is suspended; the
        // caller resumes once the result has been shown.
        if tracker.status() != TrackingStatus::Capturing {
            if let Err(e) = tick(&mut source, &mut detector, &mut tracker, &config, &events) {
                let _ = events.send(TrackerEvent::Error(e.into()));
                break 'outer;
            }
        }

        // Fixed cadence regardless of tick cost or recent failures.
        let elapsed = tick_start.elapsed();
        if elapsed < config.poll_interval {
            std::thread::sleep(config.poll_interval - elapsed);
        }
    }

    source.shutdown();
    tracing::info!("tracker loop stopped");
}

/// One detection poll. Returns `Err` only for terminal camera loss;
/// everything transient is absorbed into the state machine.
fn tick<S: FrameSource, D: FaceDetector>(
    source: &mut S,
    detector: &mut D,
    tracker: &mut StabilityTracker,
    config: &TrackerConfig,
    events: &mpsc::UnboundedSender<TrackerEvent>,
) -> Result<(), SourceError> {
    let detection = match source.poll_frame() {
        // Stream not producing decodable frames yet: skip the tick, leave
        // all counters alone.
        Ok(None) => return Ok(()),
        Ok(Some(frame)) => {
            match detector.detect(&frame.gray, frame.width, frame.height) {
                Ok(found) => found.map(|face| match config.display_size {
                    Some(display) => face.to_display(source.resolution(), display),
                    None => face,
                }),
                Err(e) => {
                    // A single bad frame must not abort tracking.
                    tracing::debug!(error = %e, "detection failed; treating as no face");
                    None
                }
            }
        }
        Err(SourceError::Frame(e)) => {
            tracing::debug!(error = %e, "frame grab failed; treating as no face");
            None
        }
        Err(e @ SourceError::Access(_)) => return Err(e),
    };

    let update = tracker.observe(detection);
    let _ = events.send(TrackerEvent::FacePosition(update.position));
    if let Some(status) = update.status_change {
        let _ = events.send(TrackerEvent::StatusChanged(status));
    }

    if update.capture {
        let Some(face) = update.position else {
            // A capture always carries a position; nothing to do otherwise.
            return Ok(());
        };
        match source.capture_photo() {
            Ok(photo) => {
                tracing::info!(bytes = photo.jpeg.len(), "capture ready");
                let _ = events.send(TrackerEvent::CaptureReady { photo, face });
                let _ = events.send(TrackerEvent::StatusChanged(TrackingStatus::Capturing));
            }
            Err(e) => {
                // The run restarts from zero; the face is still on camera.
                tracing::warn!(error = %e, "capture frame failed; returning to detection");
                if let Some(status) = tracker.resume() {
                    let _ = events.send(TrackerEvent::StatusChanged(status));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VideoFrame;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    const BOX: FaceBox = FaceBox {
        x: 100.0,
        y: 100.0,
        width: 50.0,
        height: 50.0,
    };

    const TICK: Duration = Duration::from_millis(10);

    /// Scripted frame source: always ready after `warmup` polls, records
    /// switches and shutdowns.
    struct ScriptSource {
        warmup: u32,
        fail_after: Option<usize>,
        polls: usize,
        switches: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptSource {
        fn new() -> Self {
            Self {
                warmup: 0,
                fail_after: None,
                polls: 0,
                switches: Arc::new(AtomicUsize::new(0)),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FrameSource for ScriptSource {
        fn poll_frame(&mut self) -> Result<Option<VideoFrame>, SourceError> {
            self.polls += 1;
            if let Some(limit) = self.fail_after {
                if self.polls > limit {
                    return Err(SourceError::Access("device unplugged".into()));
                }
            }
            if self.warmup > 0 {
                self.warmup -= 1;
                return Ok(None);
            }
            Ok(Some(VideoFrame {
                gray: vec![128; 64],
                width: 8,
                height: 8,
            }))
        }

        fn capture_photo(&mut self) -> Result<CapturedPhoto, SourceError> {
            Ok(CapturedPhoto {
                jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
                width: 8,
                height: 8,
            })
        }

        fn switch(&mut self, _facing: FacingMode) -> Result<(), SourceError> {
            self.switches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resolution(&self) -> (u32, u32) {
            (8, 8)
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Detector that replays a script, then keeps returning its last entry.
    struct ScriptDetector {
        script: VecDeque<Result<Option<FaceBox>, DetectorError>>,
        tail: Option<FaceBox>,
    }

    impl ScriptDetector {
        fn repeating(tail: Option<FaceBox>) -> Self {
            Self {
                script: VecDeque::new(),
                tail,
            }
        }

        fn with_script(
            script: Vec<Result<Option<FaceBox>, DetectorError>>,
            tail: Option<FaceBox>,
        ) -> Self {
            Self {
                script: script.into(),
                tail,
            }
        }
    }

    impl FaceDetector for ScriptDetector {
        fn detect(
            &mut self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Option<FaceBox>, DetectorError> {
            match self.script.pop_front() {
                Some(entry) => entry,
                None => Ok(self.tail),
            }
        }
    }

    fn test_config(threshold: u32) -> TrackerConfig {
        TrackerConfig {
            poll_interval: TICK,
            stable_threshold: threshold,
            smoothing_window: 5,
            ..TrackerConfig::default()
        }
    }

    async fn recv(
        rx: &mut mpsc::UnboundedReceiver<TrackerEvent>,
    ) -> Option<TrackerEvent> {
        timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_first_event_is_detecting() {
        let (handle, mut rx) =
            CaptureController::spawn(ScriptSource::new(), ScriptDetector::repeating(None), test_config(5));
        match recv(&mut rx).await {
            Some(TrackerEvent::StatusChanged(TrackingStatus::Detecting)) => {}
            other => panic!("expected Detecting first, got {other:?}"),
        }
        handle.stop();
    }

    #[tokio::test]
    async fn test_capture_fires_once_then_polling_suspends() {
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::repeating(Some(BOX)),
            test_config(5),
        );

        let mut positions = 0;
        let mut captures = 0;
        let mut saw_capturing = false;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::FacePosition(Some(_)) => positions += 1,
                TrackerEvent::CaptureReady { photo, face } => {
                    captures += 1;
                    assert_eq!(face, BOX);
                    assert_eq!(&photo.jpeg[..2], &[0xFF, 0xD8]);
                }
                TrackerEvent::StatusChanged(TrackingStatus::Capturing) => {
                    saw_capturing = true;
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(captures, 1);
        assert_eq!(positions, 5, "one position per tick up to the threshold");
        assert!(saw_capturing);

        // Polling is suspended in `capturing`: no further events arrive.
        tokio::time::sleep(TICK * 5).await;
        assert!(
            timeout(TICK * 2, rx.recv()).await.is_err(),
            "no events may flow while capturing"
        );
        handle.stop();
    }

    #[tokio::test]
    async fn test_resume_allows_second_capture() {
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::repeating(Some(BOX)),
            test_config(3),
        );

        // Drain up to the first capture.
        loop {
            match recv(&mut rx).await {
                Some(TrackerEvent::StatusChanged(TrackingStatus::Capturing)) => break,
                Some(_) => {}
                None => panic!("channel closed before first capture"),
            }
        }

        handle.resume();

        let mut captures = 0;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::CaptureReady { .. } => captures += 1,
                TrackerEvent::StatusChanged(TrackingStatus::Capturing) => break,
                _ => {}
            }
        }
        assert_eq!(captures, 1, "a new run captures again after resume");
        handle.stop();
    }

    #[tokio::test]
    async fn test_face_loss_resets_run() {
        // 3 detections, a loss, then steady detections: the capture may only
        // come from the second, uninterrupted run.
        let script = vec![
            Ok(Some(BOX)),
            Ok(Some(BOX)),
            Ok(Some(BOX)),
            Ok(None),
        ];
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::with_script(script, Some(BOX)),
            test_config(5),
        );

        let mut somes_since_loss = 0;
        let mut saw_loss = false;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::FacePosition(None) => {
                    saw_loss = true;
                    somes_since_loss = 0;
                }
                TrackerEvent::FacePosition(Some(_)) => somes_since_loss += 1,
                TrackerEvent::CaptureReady { .. } => {
                    assert!(saw_loss, "capture before the scripted loss is impossible");
                    assert_eq!(
                        somes_since_loss, 5,
                        "a full threshold run is required after a loss"
                    );
                    break;
                }
                _ => {}
            }
        }
        handle.stop();
    }

    #[tokio::test]
    async fn test_pause_blocks_capture_but_positions_flow() {
        // Scripted losses give the pause command time to land before any
        // real detections start.
        let mut script: Vec<Result<Option<FaceBox>, DetectorError>> = Vec::new();
        for _ in 0..5 {
            script.push(Ok(None));
        }
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::with_script(script, Some(BOX)),
            test_config(3),
        );
        handle.set_paused(true);

        let mut positions = 0;
        for _ in 0..30 {
            match recv(&mut rx).await {
                Some(TrackerEvent::FacePosition(Some(_))) => positions += 1,
                Some(TrackerEvent::CaptureReady { .. }) => {
                    panic!("capture fired while paused")
                }
                Some(_) => {}
                None => break,
            }
        }
        assert!(positions >= 10, "positions must keep flowing while paused");
        handle.stop();
    }

    #[tokio::test]
    async fn test_transient_detector_error_is_no_face() {
        let script = vec![
            Ok(Some(BOX)),
            Ok(Some(BOX)),
            Err(DetectorError::Frame("malformed frame".into())),
        ];
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::with_script(script, Some(BOX)),
            test_config(5),
        );

        let mut saw_none = false;
        let mut somes_since_none = 0;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::FacePosition(None) => {
                    saw_none = true;
                    somes_since_none = 0;
                }
                TrackerEvent::FacePosition(Some(_)) => somes_since_none += 1,
                TrackerEvent::Error(e) => panic!("transient error escalated: {e}"),
                TrackerEvent::CaptureReady { .. } => break,
                _ => {}
            }
        }
        assert!(saw_none, "the bad frame must read as a momentary loss");
        assert_eq!(somes_since_none, 5);
        handle.stop();
    }

    #[tokio::test]
    async fn test_switch_camera_resets_position_and_counter() {
        let source = ScriptSource::new();
        let switches = source.switches.clone();
        // Threshold high enough that the switch command always lands before
        // the first run could complete.
        let (handle, mut rx) = CaptureController::spawn(
            source,
            ScriptDetector::repeating(Some(BOX)),
            test_config(10),
        );

        // Let a few detections accumulate, then switch.
        let mut seen = 0;
        while seen < 3 {
            if let Some(TrackerEvent::FacePosition(Some(_))) = recv(&mut rx).await {
                seen += 1;
            }
        }
        handle.switch_camera();

        let mut somes_after_switch = 0;
        let mut switched = false;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::FacePosition(None) => {
                    switched = true;
                    somes_after_switch = 0;
                }
                TrackerEvent::FacePosition(Some(_)) => somes_after_switch += 1,
                TrackerEvent::CaptureReady { .. } => break,
                _ => {}
            }
        }
        assert!(switched, "switch must reset the reported position to none");
        assert_eq!(switches.load(Ordering::SeqCst), 1);
        assert_eq!(
            somes_after_switch, 10,
            "counter restarts from zero on the new stream"
        );
        handle.stop();
    }

    #[tokio::test]
    async fn test_camera_loss_is_terminal() {
        let mut source = ScriptSource::new();
        source.fail_after = Some(2);
        let (handle, mut rx) = CaptureController::spawn(
            source,
            ScriptDetector::repeating(Some(BOX)),
            test_config(10),
        );

        let mut saw_error = false;
        while let Some(event) = recv(&mut rx).await {
            if let TrackerEvent::Error(TrackerError::Camera(_)) = event {
                saw_error = true;
            }
        }
        assert!(saw_error);
        // Channel closed: the loop exited on its own.
        handle.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let source = ScriptSource::new();
        let shutdowns = source.shutdowns.clone();
        let (handle, mut rx) = CaptureController::spawn(
            source,
            ScriptDetector::repeating(None),
            test_config(5),
        );

        handle.stop();
        handle.stop();

        // The loop drains and closes the event channel exactly once.
        while recv(&mut rx).await.is_some() {}
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        // Stopping after exit is still harmless.
        handle.stop();
    }

    #[tokio::test]
    async fn test_warmup_frames_do_not_reset_state() {
        // Warmup polls return no frame; they must not emit positions at all.
        let mut source = ScriptSource::new();
        source.warmup = 3;
        let (handle, mut rx) = CaptureController::spawn(
            source,
            ScriptDetector::repeating(Some(BOX)),
            test_config(3),
        );

        let mut first_position: Option<Option<FaceBox>> = None;
        while let Some(event) = recv(&mut rx).await {
            match event {
                TrackerEvent::FacePosition(p) if first_position.is_none() => {
                    first_position = Some(p);
                }
                TrackerEvent::CaptureReady { .. } => break,
                _ => {}
            }
        }
        // The first reported position comes from a real frame, not a
        // warmup skip.
        assert_eq!(first_position, Some(Some(BOX)));
        handle.stop();
    }

    #[tokio::test]
    async fn test_display_rescaling_applied() {
        let mut config = test_config(50);
        config.display_size = Some((4, 4)); // half of the 8x8 source
        let (handle, mut rx) = CaptureController::spawn(
            ScriptSource::new(),
            ScriptDetector::repeating(Some(BOX)),
            config,
        );

        loop {
            match recv(&mut rx).await {
                Some(TrackerEvent::FacePosition(Some(b))) => {
                    assert_eq!(b, BOX.scaled(0.5, 0.5));
                    break;
                }
                Some(_) => {}
                None => panic!("no position delivered"),
            }
        }
        handle.stop();
    }
}
