//! Pathfinder entrypoint.

use anyhow::Result;
use clap::Parser;
use core_config::{parse_walkable_csv, Config, ConfigError, Overrides};
use core_pipeline::{Pipeline, PipelineHandle, TracingAudioSink};
use core_vision::{
    CameraIntrinsics, ColorFrame, DepthModel, ModelError, Pose, SegModel, SyntheticDepthModel,
    SyntheticSegModel,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Exit code for configuration problems.
const EXIT_CONFIG: u8 = 2;
/// Exit code for model load failures.
const EXIT_MODEL: u8 = 3;

/// Synthetic feed geometry: four depth pixels per analyzer column.
const DEMO_WIDTH: usize = 144;
const DEMO_HEIGHT: usize = 96;
/// Walking speed of the demo pose, m/s.
const DEMO_SPEED: f32 = 0.5;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pathfinder", version, about = "Monocular navigation aid pipeline")]
struct Args {
    /// Debug stream TCP port.
    #[arg(long)]
    port: Option<u16>,
    /// Grid cell edge length in meters.
    #[arg(long = "cell-size")]
    cell_size: Option<f32>,
    /// Grid cells per side.
    #[arg(long = "grid-size")]
    grid_size: Option<usize>,
    /// Maximum fusion distance in meters.
    #[arg(long = "max-distance")]
    max_distance: Option<f32>,
    /// Comma-separated walkable class ids (overrides the COCO default set).
    #[arg(long = "walkable-ids")]
    walkable_ids: Option<String>,
    /// Configuration file path (overrides discovery of `pathfinder.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Drive the pipeline from the built-in synthetic camera feed instead of
    /// waiting for an external frame source.
    #[arg(long)]
    demo: bool,
    /// Demo feed duration in seconds.
    #[arg(long = "demo-seconds", default_value_t = 5.0)]
    demo_seconds: f64,
}

/// The loaded model runners. The real neural runners are external
/// collaborators; this bundle currently ships the deterministic synthetic
/// models so the pipeline runs headless end to end.
struct ModelBundle {
    depth: Arc<dyn DepthModel>,
    seg: Arc<dyn SegModel>,
}

impl ModelBundle {
    fn load(_config: &Config) -> Result<Self, ModelError> {
        Ok(Self {
            depth: Arc::new(SyntheticDepthModel::new(DEMO_WIDTH, DEMO_HEIGHT)),
            seg: Arc::new(SyntheticSegModel::new(DEMO_WIDTH, DEMO_HEIGHT, 149)),
        })
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "pathfinder.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None, // a global subscriber is already installed
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn build_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = core_config::load_from(args.config.clone())?;
    let walkable_ids = args
        .walkable_ids
        .as_deref()
        .map(parse_walkable_csv)
        .transpose()?;
    config.apply_overrides(&Overrides {
        tcp_port: args.port,
        cell_size: args.cell_size,
        grid_size: args.grid_size,
        max_distance: args.max_distance,
        walkable_ids,
    })?;
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(target: "runtime", %err, "configuration_rejected");
            eprintln!("pathfinder: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let models = match ModelBundle::load(&config) {
        Ok(models) => models,
        Err(err) => {
            error!(target: "runtime", %err, "model_load_failed");
            eprintln!("pathfinder: {err}");
            return ExitCode::from(EXIT_MODEL);
        }
    };

    match run(config, models, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "runtime", %err, "runtime_failed");
            eprintln!("pathfinder: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config, models: ModelBundle, args: &Args) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let listener = TcpListener::bind(("0.0.0.0", config.stream.tcp_port)).await?;
        info!(
            target: "stream.net",
            port = config.stream.tcp_port,
            "debug_stream_listening"
        );

        let (handle, snapshots) = Pipeline::spawn(
            config.clone(),
            models.depth,
            models.seg,
            Arc::new(TracingAudioSink),
        );
        let stream_task = tokio::spawn(core_stream::serve(listener, snapshots));

        if args.demo {
            drive_demo_feed(&handle, args.demo_seconds).await;
        } else {
            info!(target: "runtime", "running_until_ctrl_c");
            tokio::signal::ctrl_c().await?;
        }

        if let Some(published) = handle.subscribe().borrow().clone() {
            info!(
                target: "runtime",
                fps = published.stats.fps,
                frames = published.stats.frames_processed,
                dropped = published.stats.frames_dropped,
                "final_stats"
            );
        }
        handle.stop().await;
        // The snapshot channel is closed now; the stream task drains out.
        let _ = stream_task.await;
        info!(target: "runtime", "shutdown_complete");
        Ok(())
    })
}

/// Push synthetic frames at ~30 Hz with a pose walking straight ahead.
async fn drive_demo_feed(handle: &PipelineHandle, seconds: f64) {
    let intrinsics = CameraIntrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: DEMO_WIDTH as f32 / 2.0,
        cy: DEMO_HEIGHT as f32 / 2.0,
        width: DEMO_WIDTH as u32,
        height: DEMO_HEIGHT as u32,
    };
    let pixels = vec![0u8; DEMO_WIDTH * DEMO_HEIGHT * 4];
    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    let frames = (seconds * 30.0).max(1.0) as u64;
    for i in 0..frames {
        ticker.tick().await;
        let t = i as f64 / 30.0;
        let pose = Pose::from_position_yaw(0.0, 1.5, DEMO_SPEED * t as f32, 0.0);
        handle.on_frame(
            ColorFrame::new(DEMO_WIDTH, DEMO_HEIGHT, pixels.clone()),
            pose,
            intrinsics,
            t,
        );
    }
    info!(target: "runtime", frames, "demo_feed_complete");
}
