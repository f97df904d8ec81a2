//! Frame-quantized OSC recording

pub mod clock;
pub mod coerce;
pub mod engine;
pub mod queue;
pub mod scheduler;

pub use clock::{Clock, ManualClock, RecordState, SystemClock};
pub use engine::{
    BufferedItem, Drained, PreviewEntry, PushContext, RecordItem, RecorderEngine,
    RecorderLimits, RecordingConfig,
};
pub use scheduler::FrameScheduler;
