//! Project clock
//!
//! Frame indices are always computed from wall-clock time and the session
//! origin, never from timer ticks, so late or jittery ticks only change how
//! many frames one tick emits.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::constants::{DEFAULT_FPS, DEFAULT_PROJECT_LENGTH_SECS};

/// Guards `floor` against `0.9999999` style float error at frame edges
const FRAME_EPSILON: f64 = 1e-9;

/// Wall-clock source in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic scheduling
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Recording transport state
#[derive(Debug, Clone, PartialEq)]
pub struct RecordState {
    pub armed: bool,
    pub playing: bool,
    pub fps: f64,
    /// Wall-clock ms of the session origin; 0 means "not set"
    pub start_wall_ms: f64,
    /// Project time in seconds at the session origin
    pub start_playhead: f64,
    pub project_length: f64,
    /// Last emitted frame, -1 when no session is running
    pub last_frame_index: i64,
}

impl Default for RecordState {
    fn default() -> Self {
        Self {
            armed: false,
            playing: false,
            fps: DEFAULT_FPS,
            start_wall_ms: 0.0,
            start_playhead: 0.0,
            project_length: DEFAULT_PROJECT_LENGTH_SECS,
            last_frame_index: -1,
        }
    }
}

impl RecordState {
    /// Only armed + playing runs the frame scheduler
    pub fn is_recording(&self) -> bool {
        self.armed && self.playing
    }

    /// Frame timing at `now_ms`
    pub fn runtime(&self, now_ms: f64) -> FrameRuntime {
        frame_runtime(
            self.fps,
            self.start_wall_ms,
            self.start_playhead,
            self.project_length,
            now_ms,
        )
    }
}

/// Frame timing derived from the transport at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRuntime {
    pub fps: f64,
    pub frame_step: f64,
    pub frame_index: i64,
    pub project_length: f64,
}

impl FrameRuntime {
    /// Project time of `frame`, clamped to the project
    pub fn frame_time(&self, frame: i64) -> f64 {
        (frame as f64 * self.frame_step).clamp(0.0, self.project_length)
    }
}

/// Pure frame-index computation
///
/// An unset origin (`start_wall_ms <= 0`) counts as "started now".
pub fn frame_runtime(
    fps: f64,
    start_wall_ms: f64,
    start_playhead: f64,
    project_length: f64,
    now_ms: f64,
) -> FrameRuntime {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FPS
    };
    let origin = if start_wall_ms.is_finite() && start_wall_ms > 0.0 {
        start_wall_ms
    } else {
        now_ms
    };
    let elapsed = ((now_ms - origin) / 1000.0).max(0.0);
    let playhead = if start_playhead.is_finite() {
        start_playhead
    } else {
        0.0
    };
    let project_length = if project_length.is_finite() {
        project_length.max(0.0)
    } else {
        0.0
    };
    let clamped = (playhead + elapsed).clamp(0.0, project_length);
    let frame_step = 1.0 / fps;
    let frame_index = (clamped / frame_step + FRAME_EPSILON).floor().max(0.0) as i64;

    FrameRuntime {
        fps,
        frame_step,
        frame_index,
        project_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_from_elapsed_time() {
        let rt = frame_runtime(30.0, 1_000.0, 0.0, 10.0, 2_000.0);
        assert_eq!(rt.frame_index, 30);

        let rt = frame_runtime(30.0, 1_000.0, 0.5, 10.0, 1_000.0);
        assert_eq!(rt.frame_index, 15);
    }

    #[test]
    fn test_frame_index_clamped_to_project() {
        let rt = frame_runtime(10.0, 1_000.0, 0.0, 2.0, 60_000.0);
        assert_eq!(rt.frame_index, 20);
        assert_eq!(rt.frame_time(25), 2.0);
    }

    #[test]
    fn test_unset_origin_means_now() {
        let rt = frame_runtime(30.0, 0.0, 1.0, 10.0, 123_456.0);
        assert_eq!(rt.frame_index, 30);
    }

    #[test]
    fn test_clock_before_origin() {
        let rt = frame_runtime(30.0, 5_000.0, 0.0, 10.0, 4_000.0);
        assert_eq!(rt.frame_index, 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
