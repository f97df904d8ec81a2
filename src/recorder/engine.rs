//! Recorder engine
//!
//! Owns the latest-value-per-address cache, the record queue, the preview
//! cache and the transport state. All mutation happens from one context (the
//! recorder worker), so nothing here is synchronized.
//!
//! While armed and playing, incoming values only update the latest-value
//! cache; the frame scheduler samples that cache once per frame. Otherwise
//! values go to the preview cache for live display.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clock::{Clock, FrameRuntime, RecordState};
use super::coerce;
use super::queue::{PreviewCache, RecordQueue};
use crate::codec::OscArg;
use crate::config::RecorderConfig;
use crate::constants::{DEFAULT_FPS, MIN_TICK_MS};

/// Queue capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderLimits {
    pub record_queue_max: usize,
    pub preview_max: usize,
    pub drain_chunk: usize,
    pub compact_threshold: usize,
}

impl From<&RecorderConfig> for RecorderLimits {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            record_queue_max: config.record_queue_max,
            preview_max: config.preview_max,
            drain_chunk: config.drain_chunk,
            compact_threshold: config.compact_threshold,
        }
    }
}

impl Default for RecorderLimits {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

/// Cached value of one address
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestValue {
    pub value: f64,
    /// First frame this value may be recorded at
    pub first_frame_index: i64,
}

/// One recorded sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordItem {
    pub address: String,
    pub value: f64,
    /// Seconds into the project
    pub time: f64,
    pub record: bool,
    /// Wall-clock ms of the tick that emitted it
    pub timestamp: i64,
}

/// Latest sample of an address awaiting live display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub address: String,
    pub value: f64,
    pub args: Vec<OscArg>,
    pub host: Option<String>,
    pub source_port: Option<u16>,
    pub listen_port: Option<u16>,
    pub record: bool,
    pub timestamp: i64,
}

/// Item returned by a drain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BufferedItem {
    Record(RecordItem),
    Preview(PreviewEntry),
}

impl BufferedItem {
    pub fn address(&self) -> &str {
        match self {
            BufferedItem::Record(item) => &item.address,
            BufferedItem::Preview(entry) => &entry.address,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            BufferedItem::Record(item) => item.value,
            BufferedItem::Preview(entry) => entry.value,
        }
    }
}

/// Where a pushed value came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushContext {
    pub args: Vec<OscArg>,
    pub host: Option<String>,
    pub source_port: Option<u16>,
    pub listen_port: Option<u16>,
    /// Receive time; the engine clock is used when absent
    pub timestamp: Option<i64>,
}

/// Transport update; absent or invalid fields keep their previous value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingConfig {
    #[serde(deserialize_with = "coerce::deserialize_truthy")]
    pub armed: bool,
    #[serde(deserialize_with = "coerce::deserialize_truthy")]
    pub playing: bool,
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub fps: Option<f64>,
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub start_wall_ms: Option<f64>,
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub start_playhead: Option<f64>,
    #[serde(deserialize_with = "coerce::deserialize_number")]
    pub project_length: Option<f64>,
}

/// Result of one drain
#[derive(Debug, Clone, PartialEq)]
pub struct Drained {
    pub items: Vec<BufferedItem>,
    pub remaining: usize,
    pub dropped: u64,
}

/// The recording engine
pub struct RecorderEngine {
    clock: Box<dyn Clock>,
    limits: RecorderLimits,
    state: RecordState,
    latest: HashMap<String, LatestValue>,
    record_queue: RecordQueue<RecordItem>,
    preview: PreviewCache<String, PreviewEntry>,
    /// Polling period while a session runs
    tick: Option<Duration>,
}

impl RecorderEngine {
    pub fn new(limits: RecorderLimits, clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            limits,
            state: RecordState::default(),
            latest: HashMap::new(),
            record_queue: RecordQueue::new(limits.record_queue_max, limits.compact_threshold),
            preview: PreviewCache::new(limits.preview_max),
            tick: None,
        }
    }

    /// Engine with transport defaults taken from `config`
    pub fn from_config(config: &RecorderConfig, clock: Box<dyn Clock>) -> Self {
        let mut engine = Self::new(RecorderLimits::from(config), clock);
        engine.state.fps = config.fps;
        engine.state.project_length = config.project_length;
        engine
    }

    pub fn state(&self) -> &RecordState {
        &self.state
    }

    pub fn limits(&self) -> &RecorderLimits {
        &self.limits
    }

    pub fn latest(&self, address: &str) -> Option<&LatestValue> {
        self.latest.get(address)
    }

    /// Record queue length plus preview entries
    pub fn pending(&self) -> usize {
        self.record_queue.len() + self.preview.len()
    }

    pub fn dropped(&self) -> u64 {
        self.record_queue.dropped()
    }

    /// Polling period of the frame scheduler, `None` when idle
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick
    }

    fn runtime(&self) -> (i64, FrameRuntime) {
        let now = self.clock.now_ms();
        (now, self.state.runtime(now as f64))
    }

    /// Accept one incoming value
    pub fn push(&mut self, address: &str, value: f64, context: PushContext) {
        if address.is_empty() || !value.is_finite() {
            return;
        }

        let (now, runtime) = self.runtime();
        self.latest
            .entry(address.to_string())
            .and_modify(|latest| latest.value = value)
            .or_insert(LatestValue {
                value,
                first_frame_index: runtime.frame_index,
            });

        if self.state.is_recording() {
            return;
        }

        let entry = PreviewEntry {
            address: address.to_string(),
            value,
            args: context.args,
            host: context.host,
            source_port: context.source_port,
            listen_port: context.listen_port,
            record: false,
            timestamp: context.timestamp.unwrap_or(now),
        };
        if let Some(evicted) = self.preview.insert(address.to_string(), entry) {
            tracing::trace!(%evicted, "preview cache full, evicted oldest address");
        }
    }

    /// Apply a transport update and restart the scheduler
    pub fn set_recording_config(&mut self, config: &RecordingConfig) {
        let state = &mut self.state;
        state.armed = config.armed;
        state.playing = config.playing;
        state.fps = match config.fps {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ if state.fps > 0.0 => state.fps,
            _ => DEFAULT_FPS,
        };
        if let Some(length) = config.project_length.filter(|l| l.is_finite() && *l >= 0.0) {
            state.project_length = length;
        }
        if let Some(start) = config.start_wall_ms.filter(|s| s.is_finite() && *s > 0.0) {
            state.start_wall_ms = start;
        }
        if let Some(playhead) = config.start_playhead.filter(|p| p.is_finite()) {
            state.start_playhead = playhead.max(0.0);
        }

        tracing::debug!(
            armed = state.armed,
            playing = state.playing,
            fps = state.fps,
            project_length = state.project_length,
            "recording config updated"
        );
        self.restart_scheduler();
    }

    fn restart_scheduler(&mut self) {
        self.tick = None;
        if !self.state.is_recording() {
            self.state.last_frame_index = -1;
            return;
        }

        let (_, runtime) = self.runtime();
        for latest in self.latest.values_mut() {
            latest.first_frame_index = runtime.frame_index;
        }
        self.state.last_frame_index = runtime.frame_index - 1;
        self.emit_frames();

        let tick_ms = (1000.0 / (runtime.fps * 2.0)).max(MIN_TICK_MS);
        self.tick = Some(Duration::from_micros((tick_ms * 1000.0).round() as u64));
        tracing::info!(
            frame = runtime.frame_index,
            tick_ms,
            "recording session started"
        );
    }

    /// Emit every frame between the last emitted one and now
    ///
    /// Returns the number of record items appended.
    pub fn emit_frames(&mut self) -> usize {
        if !self.state.is_recording() || self.latest.is_empty() {
            return 0;
        }

        let (now, runtime) = self.runtime();
        let target = runtime.frame_index;
        let mut emitted = 0;
        for frame in (self.state.last_frame_index + 1)..=target {
            let time = runtime.frame_time(frame);
            for (address, latest) in &self.latest {
                if frame < latest.first_frame_index {
                    continue;
                }
                self.record_queue.push(RecordItem {
                    address: address.clone(),
                    value: latest.value,
                    time,
                    record: true,
                    timestamp: now,
                });
                emitted += 1;
            }
        }
        self.state.last_frame_index = self.state.last_frame_index.max(target);
        emitted
    }

    /// Take up to `limit` items: record queue first, then preview entries
    pub fn drain_buffer(&mut self, limit: Option<usize>) -> Drained {
        let chunk = self.limits.drain_chunk.max(1);
        let limit = limit.map_or(chunk, |l| l.clamp(1, chunk));

        let mut items: Vec<BufferedItem> = self
            .record_queue
            .pop_front(limit)
            .into_iter()
            .map(BufferedItem::Record)
            .collect();
        if items.len() < limit {
            let take = limit - items.len();
            items.extend(self.preview.take_front(take).into_iter().map(BufferedItem::Preview));
        }

        Drained {
            items,
            remaining: self.pending(),
            dropped: self.record_queue.dropped(),
        }
    }

    /// Empty the record queue, drop counter and preview cache
    pub fn clear_queues(&mut self) {
        self.record_queue.clear();
        self.preview.clear();
    }

    /// Forget cached values after the listener stops or is replaced
    pub fn reset_listener_state(&mut self) {
        self.latest.clear();
        self.state.last_frame_index = -1;
    }

    /// Stop the scheduler and release all buffered data
    pub fn shutdown(&mut self) {
        self.state.armed = false;
        self.state.playing = false;
        self.tick = None;
        self.reset_listener_state();
        self.clear_queues();
    }
}
