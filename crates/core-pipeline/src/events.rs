//! Pipeline event and fan-out types.

use core_nav::NavigationOutput;
use core_vision::{CameraIntrinsics, ColorFrame, Pose};

/// One camera frame with its pose, as accepted by the intake.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub frame: ColorFrame,
    pub pose: Pose,
    pub intrinsics: CameraIntrinsics,
    pub timestamp_s: f64,
}

/// User-facing pipeline condition, published with every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStatus {
    #[default]
    Normal,
    /// Ground confidence has been below 0.3 for consecutive frames.
    LowGroundConfidence,
    /// No candidate heading survived; UI shows BLOCKED.
    Blocked,
}

/// Throughput and health counters published alongside each output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorStats {
    /// Exponential moving average of the processed-frame rate.
    pub fps: f32,
    /// Wall time of the last depth+segmentation join, milliseconds.
    pub last_vision_ms: f32,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    /// Non-finite samples skipped inside the analyzer, cumulative.
    pub skipped_samples: u64,
    pub status: PipelineStatus,
}

/// Spatialized audio cues, in priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioCue {
    /// A surface discontinuity inside 3 m: severity derives from the
    /// discontinuity magnitude.
    SurfaceChange {
        severity: f32,
        bearing: f32,
        distance: f32,
    },
    /// The path is blocked; rendered as a virtually-touching obstacle.
    ImminentObstacle { distance: f32, bearing: f32 },
    /// Nearest obstacle within 5 m.
    Obstacle { distance: f32, bearing: f32 },
    /// Sustained low ground confidence.
    Caution,
}

/// Spatial audio synthesis is an external collaborator; the pipeline only
/// needs somewhere to hand cues.
pub trait AudioSink: Send + Sync + 'static {
    fn play(&self, cue: AudioCue);
}

/// Default sink: log the cue. Keeps the pipeline runnable headless.
#[derive(Debug, Default)]
pub struct TracingAudioSink;

impl AudioSink for TracingAudioSink {
    fn play(&self, cue: AudioCue) {
        tracing::info!(target: "audio.cue", ?cue, "cue");
    }
}

/// Map a navigation decision to at most one audio cue.
///
/// Priority: imminent surface change, then blocked path, then a nearby
/// obstacle (nothing beyond 5 m), then a caution marker while ground
/// confidence is degraded.
pub fn map_audio(output: &NavigationOutput, status: PipelineStatus) -> Option<AudioCue> {
    if let Some(ahead) = &output.discontinuity_ahead {
        if ahead.distance_m < 3.0 {
            return Some(AudioCue::SurfaceChange {
                severity: ahead.discontinuity.magnitude.clamp(0.0, 1.0),
                bearing: ahead.discontinuity.bearing,
                distance: ahead.distance_m,
            });
        }
    }
    if output.is_path_blocked {
        return Some(AudioCue::ImminentObstacle {
            distance: 0.1,
            bearing: output.nearest_obstacle_bearing,
        });
    }
    if output.nearest_obstacle_distance < 5.0 {
        return Some(AudioCue::Obstacle {
            distance: output.nearest_obstacle_distance,
            bearing: output.nearest_obstacle_bearing,
        });
    }
    if status == PipelineStatus::LowGroundConfidence {
        return Some(AudioCue::Caution);
    }
    None
}
