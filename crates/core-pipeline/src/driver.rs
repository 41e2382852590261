//! The pipeline worker and its handle.

use crate::events::{map_audio, AudioSink, FramePacket, PipelineStatus, SensorStats};
use crate::smoothing::HeadingSmoother;
use core_config::Config;
use core_grid::OccupancyGrid;
use core_nav::{NavigationOutput, NavigationPlanner};
use core_scene::SceneAnalyzer;
use core_stream::{build_snapshot, GridSnapshot};
use core_vision::{CameraIntrinsics, ColorFrame, DepthModel, Pose, SegModel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Bootstrap dt before the second frame arrives.
const BOOTSTRAP_DT: f32 = 1.0 / 60.0;
/// Consecutive low-confidence frames before the caution state latches.
const LOW_GROUND_FRAMES: u32 = 3;
/// Ground confidence threshold for the caution state.
const LOW_GROUND_CONFIDENCE: f32 = 0.3;

/// The per-frame publication: decision and stats land together so observers
/// never see them out of step.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub output: NavigationOutput,
    pub stats: SensorStats,
    pub frame_timestamp: f64,
}

/// Spawns and owns the pipeline worker task.
pub struct Pipeline;

impl Pipeline {
    /// Spawn the worker. Must be called on a tokio runtime. Returns the
    /// intake handle and the snapshot stream the caller can wire to
    /// `core_stream::serve`.
    pub fn spawn(
        config: Config,
        depth_model: Arc<dyn DepthModel>,
        seg_model: Arc<dyn SegModel>,
        audio: Arc<dyn AudioSink>,
    ) -> (PipelineHandle, mpsc::Receiver<GridSnapshot>) {
        // Single-slot mailbox: a busy worker means the frame is dropped.
        let (intake_tx, intake_rx) = mpsc::channel::<FramePacket>(1);
        let (snapshot_tx, snapshot_rx) = mpsc::channel::<GridSnapshot>(2);
        let (output_tx, output_rx) = watch::channel::<Option<Published>>(None);
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = tokio::spawn(run_worker(
            config,
            depth_model,
            seg_model,
            audio,
            intake_rx,
            output_tx,
            snapshot_tx,
            dropped.clone(),
        ));

        (
            PipelineHandle {
                intake: intake_tx,
                output: output_rx,
                dropped,
                worker,
            },
            snapshot_rx,
        )
    }
}

/// Intake plus observation side of a running pipeline.
pub struct PipelineHandle {
    intake: mpsc::Sender<FramePacket>,
    output: watch::Receiver<Option<Published>>,
    dropped: Arc<AtomicU64>,
    worker: tokio::task::JoinHandle<()>,
}

impl PipelineHandle {
    /// Offer one frame. Never blocks: if the worker is still busy with the
    /// previous frame, this frame is dropped and counted.
    pub fn on_frame(
        &self,
        frame: ColorFrame,
        pose: Pose,
        intrinsics: CameraIntrinsics,
        timestamp_s: f64,
    ) {
        let packet = FramePacket {
            frame,
            pose,
            intrinsics,
            timestamp_s,
        };
        if let Err(err) = self.intake.try_send(packet) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(target: "pipeline.intake", %err, "frame_dropped");
        }
    }

    /// Latest published decision + stats; `None` until the first frame
    /// completes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Published>> {
        self.output.clone()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the intake and wait for the worker to finish its current frame
    /// and exit.
    pub async fn stop(self) {
        drop(self.intake);
        if let Err(err) = self.worker.await {
            warn!(target: "pipeline", %err, "worker_join_failed");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    config: Config,
    depth_model: Arc<dyn DepthModel>,
    seg_model: Arc<dyn SegModel>,
    audio: Arc<dyn AudioSink>,
    mut intake: mpsc::Receiver<FramePacket>,
    output_tx: watch::Sender<Option<Published>>,
    snapshot_tx: mpsc::Sender<GridSnapshot>,
    dropped: Arc<AtomicU64>,
) {
    let analyzer = SceneAnalyzer::new(config.analyzer.clone(), config.walkable_set());
    let mut planner = NavigationPlanner::new(config.planner.clone());
    let mut grid = OccupancyGrid::new(&config);
    let mut pose_smoother = HeadingSmoother::new(config.processing.heading_smoothing_alpha);
    let send_every = config.stream.send_every_n_frames.max(1) as u64;

    let mut prev_timestamp: Option<f64> = None;
    let mut frames_processed: u64 = 0;
    let mut skipped_samples: u64 = 0;
    let mut fps = 0.0f32;
    let mut low_ground_run = 0u32;

    info!(target: "pipeline", "worker_started");
    while let Some(packet) = intake.recv().await {
        // Timestamps from intake are expected monotone; a regression clamps
        // dt to zero rather than rewinding decay.
        let dt = match prev_timestamp {
            None => BOOTSTRAP_DT,
            Some(prev) if packet.timestamp_s < prev => {
                warn!(
                    target: "pipeline.frame",
                    prev,
                    now = packet.timestamp_s,
                    "non_monotonic_timestamp"
                );
                0.0
            }
            Some(prev) => (packet.timestamp_s - prev) as f32,
        };
        prev_timestamp = Some(prev_timestamp.map_or(packet.timestamp_s, |p: f64| {
            p.max(packet.timestamp_s)
        }));

        // Depth and segmentation run as a pair of blocking workers; the join
        // is the per-frame barrier.
        let vision_start = Instant::now();
        let depth_task = {
            let model = depth_model.clone();
            let frame = packet.frame.clone();
            tokio::task::spawn_blocking(move || model.run_depth(&frame))
        };
        let seg_task = {
            let model = seg_model.clone();
            let frame = packet.frame.clone();
            tokio::task::spawn_blocking(move || model.run_seg(&frame))
        };
        let (depth_join, seg_join) = tokio::join!(depth_task, seg_task);
        let vision_ms = vision_start.elapsed().as_secs_f32() * 1000.0;

        let vision = match (depth_join, seg_join) {
            (Ok(Ok(depth)), Ok(Ok(seg))) => Some((depth, seg)),
            (Ok(Err(err)), _) | (_, Ok(Err(err))) => {
                warn!(target: "pipeline.vision", %err, "model_failed");
                None
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(target: "pipeline.vision", %err, "vision_task_panicked");
                None
            }
        };

        let translation = packet.pose.translation();
        let user_pos = (translation[0], translation[2]);
        let heading = pose_smoother.smooth(packet.pose.yaw());

        let mut discontinuity_count = 0u32;
        let output = match vision {
            Some((depth_frame, seg_frame)) => {
                match (depth_frame.into_depth_map(), seg_frame.into_seg_map()) {
                    (Ok(depth), Ok(seg)) => {
                        let scene = analyzer.analyze(&depth, &seg, config.analyzer.camera_hfov);
                        skipped_samples += scene.skipped_samples as u64;
                        discontinuity_count = scene.discontinuities.len() as u32;
                        planner.update(&scene, user_pos, heading, dt, &mut grid)
                    }
                    (Err(err), _) | (_, Err(err)) => {
                        // Shape mismatch: log, skip the frame, keep going.
                        warn!(target: "pipeline.vision", %err, "shape_mismatch_frame_skipped");
                        continue;
                    }
                }
            }
            // Pass-through with no scene evidence.
            None => NavigationOutput::degraded(),
        };

        frames_processed += 1;
        if dt > 0.0 {
            let instantaneous = 1.0 / dt;
            fps = if fps == 0.0 {
                instantaneous
            } else {
                fps * 0.9 + instantaneous * 0.1
            };
        }

        if output.ground_confidence < LOW_GROUND_CONFIDENCE {
            low_ground_run += 1;
        } else {
            low_ground_run = 0;
        }
        let status = if output.is_path_blocked {
            PipelineStatus::Blocked
        } else if low_ground_run >= LOW_GROUND_FRAMES {
            PipelineStatus::LowGroundConfidence
        } else {
            PipelineStatus::Normal
        };

        if let Some(cue) = map_audio(&output, status) {
            audio.play(cue);
        }

        let stats = SensorStats {
            fps,
            last_vision_ms: vision_ms,
            frames_processed,
            frames_dropped: dropped.load(Ordering::Relaxed),
            skipped_samples,
            status,
        };
        let _ = output_tx.send(Some(Published {
            output: output.clone(),
            stats,
            frame_timestamp: packet.timestamp_s,
        }));

        if frames_processed % send_every == 0 {
            let snapshot = build_snapshot(
                &grid,
                Some(&output),
                discontinuity_count,
                packet.timestamp_s,
                translation,
            );
            if snapshot_tx.try_send(snapshot).is_err() {
                // The stream owns its own backpressure; never stall here.
                debug!(target: "pipeline.stream", "snapshot_dropped");
            }
        }
    }
    info!(target: "pipeline", frames_processed, "worker_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AudioCue;
    use core_vision::{
        DepthFrame, ModelError, SegFrame, SyntheticDepthModel, SyntheticSegModel,
    };
    use std::sync::Mutex;
    use std::time::Duration;

    // Two seg pixels per analyzer column (36 columns) so no slab is empty.
    const W: usize = 72;
    const H: usize = 48;

    fn frame() -> ColorFrame {
        ColorFrame::new(W, H, vec![0u8; W * H * 4])
    }

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: W as f32 / 2.0,
            cy: H as f32 / 2.0,
            width: W as u32,
            height: H as u32,
        }
    }

    struct NullSink;
    impl AudioSink for NullSink {
        fn play(&self, _cue: AudioCue) {}
    }

    struct RecordingSink(Mutex<Vec<AudioCue>>);
    impl AudioSink for RecordingSink {
        fn play(&self, cue: AudioCue) {
            self.0.lock().unwrap().push(cue);
        }
    }

    struct FailingDepthModel;
    impl DepthModel for FailingDepthModel {
        fn run_depth(&self, _frame: &ColorFrame) -> Result<DepthFrame, ModelError> {
            Err(ModelError::Inference("no backend".into()))
        }
    }

    struct MisshapenSegModel;
    impl SegModel for MisshapenSegModel {
        fn run_seg(&self, _frame: &ColorFrame) -> Result<SegFrame, ModelError> {
            Ok(SegFrame {
                width: W,
                height: H,
                labels: vec![149; 7], // wrong length
            })
        }
    }

    struct SlowDepthModel(Duration);
    impl DepthModel for SlowDepthModel {
        fn run_depth(&self, frame: &ColorFrame) -> Result<DepthFrame, ModelError> {
            std::thread::sleep(self.0);
            SyntheticDepthModel::new(W, H).run_depth(frame)
        }
    }

    fn spawn_with(
        depth: Arc<dyn DepthModel>,
        seg: Arc<dyn SegModel>,
        audio: Arc<dyn AudioSink>,
    ) -> (PipelineHandle, mpsc::Receiver<GridSnapshot>) {
        let mut config = Config::default();
        config.stream.send_every_n_frames = 1;
        Pipeline::spawn(config, depth, seg, audio)
    }

    async fn wait_for_output(
        rx: &mut watch::Receiver<Option<Published>>,
    ) -> Published {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(published) = rx.borrow_and_update().clone() {
                    return published;
                }
                rx.changed().await.expect("pipeline gone");
            }
        })
        .await
        .expect("no output published")
    }

    #[tokio::test]
    async fn synthetic_frames_publish_open_ground() {
        let (handle, _snapshots) = spawn_with(
            Arc::new(SyntheticDepthModel::new(W, H)),
            Arc::new(SyntheticSegModel::new(W, H, 149)),
            Arc::new(NullSink),
        );
        let mut rx = handle.subscribe();
        for i in 0..6 {
            handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), i as f64 / 30.0);
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        let published = wait_for_output(&mut rx).await;
        assert!(published.output.ground_confidence > 0.9);
        assert!(!published.output.is_path_blocked);
        assert_eq!(published.stats.status, PipelineStatus::Normal);
        assert!(published.stats.frames_processed >= 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn model_failure_publishes_degraded_output() {
        let (handle, _snapshots) = spawn_with(
            Arc::new(FailingDepthModel),
            Arc::new(SyntheticSegModel::new(W, H, 149)),
            Arc::new(NullSink),
        );
        let mut rx = handle.subscribe();
        handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), 0.0);
        let published = wait_for_output(&mut rx).await;
        assert_eq!(published.output.ground_confidence, 0.0);
        assert!(!published.output.is_path_blocked);
        assert!(published.output.nearest_obstacle_distance.is_infinite());
        handle.stop().await;
    }

    #[tokio::test]
    async fn shape_mismatch_skips_the_frame_without_publishing() {
        let (handle, _snapshots) = spawn_with(
            Arc::new(SyntheticDepthModel::new(W, H)),
            Arc::new(MisshapenSegModel),
            Arc::new(NullSink),
        );
        let rx = handle.subscribe();
        handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), 0.0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.borrow().is_none(), "skipped frame must not publish");
        handle.stop().await;
    }

    #[tokio::test]
    async fn busy_worker_drops_frames_instead_of_blocking() {
        let (handle, _snapshots) = spawn_with(
            Arc::new(SlowDepthModel(Duration::from_millis(150))),
            Arc::new(SyntheticSegModel::new(W, H, 149)),
            Arc::new(NullSink),
        );
        for i in 0..10 {
            handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), i as f64 / 30.0);
        }
        // All ten offers returned immediately; most frames were dropped.
        assert!(handle.frames_dropped() >= 5);
        handle.stop().await;
    }

    #[tokio::test]
    async fn sustained_low_ground_confidence_latches_caution() {
        // Nothing walkable: label 0 is not in the walkable set.
        let (handle, _snapshots) = spawn_with(
            Arc::new(SyntheticDepthModel::new(W, H)),
            Arc::new(SyntheticSegModel::new(W, H, 0)),
            Arc::new(RecordingSink(Mutex::new(Vec::new()))),
        );
        let mut rx = handle.subscribe();
        let mut last = None;
        for i in 0..8 {
            handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), i as f64 / 30.0);
            tokio::time::sleep(Duration::from_millis(40)).await;
            last = rx.borrow_and_update().clone();
        }
        let published = last.expect("published");
        // Everything unwalkable: the planner blocks, which outranks caution.
        assert!(matches!(
            published.stats.status,
            PipelineStatus::Blocked | PipelineStatus::LowGroundConfidence
        ));
        handle.stop().await;
    }

    #[tokio::test]
    async fn snapshots_follow_processed_frames() {
        let (handle, mut snapshots) = spawn_with(
            Arc::new(SyntheticDepthModel::new(W, H)),
            Arc::new(SyntheticSegModel::new(W, H, 149)),
            Arc::new(NullSink),
        );
        handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), 0.25);
        let snapshot = tokio::time::timeout(Duration::from_secs(5), snapshots.recv())
            .await
            .expect("snapshot timeout")
            .expect("snapshot channel open");
        assert_eq!(snapshot.timestamp, 0.25);
        assert_eq!(snapshot.grid_size, 200);
        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_ends_the_worker() {
        let (handle, _snapshots) = spawn_with(
            Arc::new(SyntheticDepthModel::new(W, H)),
            Arc::new(SyntheticSegModel::new(W, H, 149)),
            Arc::new(NullSink),
        );
        handle.on_frame(frame(), Pose::IDENTITY, intrinsics(), 0.0);
        handle.stop().await; // completes the in-flight frame, then exits
    }
}
