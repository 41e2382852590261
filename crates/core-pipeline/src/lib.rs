//! The pipeline driver: frame intake, vision fan-out/join, planning, and
//! publication.
//!
//! Single-writer stages connected by channels. The intake never blocks: a
//! busy worker means the frame is dropped (and counted). The pipeline task
//! is the sole owner of the grid and the planner; audio and the debug stream
//! are downstream consumers fed by value.

pub mod driver;
pub mod events;
pub mod smoothing;

pub use driver::{Pipeline, PipelineHandle, Published};
pub use events::{
    map_audio, AudioCue, AudioSink, FramePacket, PipelineStatus, SensorStats, TracingAudioSink,
};
pub use smoothing::HeadingSmoother;
