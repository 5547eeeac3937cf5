/// Capture session aggregate
pub mod aggregate;

/// Face-stability analyzer
pub mod analyzer;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Slot-by-slot capture driver
pub mod sequencer;

pub use aggregate::{
    CaptureSession, CaptureSlot, Frame, Services, SlotKind, SlotSpec, AGGREGATE_TYPE,
};
pub use analyzer::{
    Detection, DetectionTick, FaceDetector, FrameAnalyzer, FrameSource, Hint, TickReport,
};
pub use commands::Command;
pub use events::Event;
pub use sequencer::CaptureSequencer;
