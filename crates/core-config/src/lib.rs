//! Configuration loading and validation.
//!
//! A single process-wide table of tunables, grouped the way the runtime
//! consumes them (grid geometry, elevation thresholds, temporal decay,
//! processing, analyzer, planner, stream). Defaults are the contract: a
//! missing `pathfinder.toml` yields a fully usable configuration, and every
//! field can be overridden independently. Unknown TOML fields are ignored so
//! the file format can evolve forward without breaking older binaries.
//!
//! Validation is fatal by design: a grid with zero cells or a non-finite
//! threshold cannot be recovered from at runtime, so `validate` runs once at
//! startup and the binary maps its error to exit code 2.

use serde::Deserialize;
use std::collections::HashSet;
use std::{fs, path::PathBuf};
use thiserror::Error;
use tracing::info;

/// Default walkable label set: COCO-panoptic "stuff" classes that read as
/// ground surface (carpet, dirt, floor-*, grass, gravel, pavement, road, …).
pub const DEFAULT_WALKABLE_IDS: &[u8] = &[
    101, 111, 114, 115, 116, 117, 118, 124, 125, 126, 131, 136, 140, 144, 145, 147, 149, 152, 154,
    161,
];

/// Fatal configuration problems. Surfaced from the startup sequence only;
/// nothing at frame rate constructs one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    /// Cell edge length in meters.
    pub cell_size: f32,
    /// Cells per side. 200 × 0.10 m -> a 20 m × 20 m footprint.
    pub grid_size: usize,
    /// Maximum fusion distance in meters.
    pub max_distance: f32,
    /// Fraction of the half-extent kept as border; crossing into it triggers
    /// a recenter (0.2 -> recenter past 80% of the half-extent).
    pub recenter_edge_margin: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.10,
            grid_size: 200,
            max_distance: 10.0,
            recenter_edge_margin: 0.2,
        }
    }
}

impl GridConfig {
    /// Half of the grid footprint edge, in meters.
    pub fn half_extent(&self) -> f32 {
        self.grid_size as f32 * self.cell_size / 2.0
    }
}

/// Elevation thresholds, all meters relative to the estimated floor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ElevationConfig {
    pub step_min: f32,
    pub step_max: f32,
    pub curb_min: f32,
    pub dropoff: f32,
    pub ramp_max_slope: f32,
    pub stair_step_size: f32,
    pub stair_tolerance: f32,
    /// Height range within a cell above which the cell reads as an obstacle.
    pub obstacle_height: f32,
    pub floor_tolerance: f32,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            step_min: 0.05,
            step_max: 0.20,
            curb_min: 0.20,
            dropoff: 0.30,
            ramp_max_slope: 0.15,
            stair_step_size: 0.18,
            stair_tolerance: 0.03,
            obstacle_height: 0.25,
            floor_tolerance: 0.20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemporalConfig {
    /// Per-60Hz-frame confidence decay factor; `apply_decay` scales the
    /// exponent by `dt * 60`.
    pub confidence_decay: f32,
    /// Cells decaying below this confidence reset to Unknown.
    pub min_confidence: u8,
    /// Saturating confidence boost per observation.
    pub observation_boost: u8,
    pub max_confidence: u8,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            confidence_decay: 0.995,
            min_confidence: 20,
            observation_boost: 30,
            max_confidence: 255,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Alpha of the driver's exponential heading filter (shortest arc).
    pub heading_smoothing_alpha: f32,
    /// Floor samples required before the floor estimate moves.
    pub min_floor_samples: usize,
    /// Observations required before a cell counts as valid.
    pub min_hit_count: u16,
    /// A new floor estimate within this distance blends; farther replaces.
    pub elevation_merge_threshold: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            heading_smoothing_alpha: 0.2,
            min_floor_samples: 10,
            min_hit_count: 3,
            elevation_merge_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Emit a debug snapshot every N processed frames.
    pub send_every_n_frames: u32,
    pub max_elevation_changes: u32,
    pub tcp_port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            send_every_n_frames: 3,
            max_elevation_changes: 10,
            tcp_port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Horizontal bins across the image.
    pub columns: usize,
    /// Raw-depth threshold above which a sample reads as sky. Applied to the
    /// model output before any metric conversion.
    pub sky_depth_threshold: f32,
    /// Minimum absolute depth gradient for a discontinuity candidate.
    pub discontinuity_min_abs_gradient: f32,
    /// Candidate gradient must exceed the column median by this ratio.
    pub discontinuity_outlier_ratio: f32,
    /// Minimum normalized magnitude for a reported discontinuity.
    pub discontinuity_threshold: f32,
    /// Horizontal field of view in radians.
    pub camera_hfov: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            columns: 36,
            sky_depth_threshold: 0.95,
            discontinuity_min_abs_gradient: 0.3,
            discontinuity_outlier_ratio: 3.0,
            discontinuity_threshold: 0.08,
            camera_hfov: 1.0472,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Relative-depth to meters scale: meters ~= depth_scale / (relative + eps).
    pub depth_scale: f32,
    /// Blend factor of the planner's per-frame heading smoothing.
    pub smoothing_factor: f32,
    /// Rays with clearance at or below this distance are rejected.
    pub safety_margin: f32,
    /// Ray-march range in meters.
    pub max_march: f32,
    /// Rays cast over ±90° for heading selection.
    pub heading_rays: usize,
    /// Rays cast over ±45° for the forward threat scan.
    pub threat_rays: usize,
    /// Metric conversion clamp.
    pub max_reliable_depth: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            depth_scale: 10.0,
            smoothing_factor: 0.3,
            safety_margin: 0.5,
            max_march: 10.0,
            heading_rays: 36,
            threat_rays: 18,
            max_reliable_depth: 30.0,
        }
    }
}

/// The merged configuration consumed by every stage.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub elevation: ElevationConfig,
    pub temporal: TemporalConfig,
    pub processing: ProcessingConfig,
    pub stream: StreamConfig,
    pub analyzer: AnalyzerConfig,
    pub planner: PlannerConfig,
    /// Semantic class ids treated as walkable ground.
    pub walkable_ids: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            elevation: ElevationConfig::default(),
            temporal: TemporalConfig::default(),
            processing: ProcessingConfig::default(),
            stream: StreamConfig::default(),
            analyzer: AnalyzerConfig::default(),
            planner: PlannerConfig::default(),
            walkable_ids: DEFAULT_WALKABLE_IDS.to_vec(),
        }
    }
}

/// Best-effort config path: prefer a local `pathfinder.toml`, then the
/// platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("pathfinder.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("pathfinder").join("pathfinder.toml");
    }
    PathBuf::from("pathfinder.toml")
}

/// Load configuration from `path` (or the discovered location). A missing
/// file yields defaults; an unreadable or unparsable file is fatal. The
/// returned config is already validated.
pub fn load_from(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(discover);
    let config = if path.exists() {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Walkable class ids as a set for per-pixel membership tests.
    pub fn walkable_set(&self) -> HashSet<u8> {
        self.walkable_ids.iter().copied().collect()
    }

    /// Reject configurations the runtime cannot operate on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn finite_positive(name: &str, v: f32) -> Result<(), ConfigError> {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and positive, got {v}"
                )));
            }
            Ok(())
        }

        finite_positive("grid.cell_size", self.grid.cell_size)?;
        finite_positive("grid.max_distance", self.grid.max_distance)?;
        if self.grid.grid_size == 0 {
            return Err(ConfigError::Invalid("grid.grid_size must be > 0".into()));
        }
        if !self.grid.recenter_edge_margin.is_finite()
            || !(0.0..1.0).contains(&self.grid.recenter_edge_margin)
        {
            return Err(ConfigError::Invalid(format!(
                "grid.recenter_edge_margin must be in [0, 1), got {}",
                self.grid.recenter_edge_margin
            )));
        }
        if !self.temporal.confidence_decay.is_finite()
            || !(0.0..=1.0).contains(&self.temporal.confidence_decay)
            || self.temporal.confidence_decay == 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "temporal.confidence_decay must be in (0, 1], got {}",
                self.temporal.confidence_decay
            )));
        }
        if self.analyzer.columns == 0 {
            return Err(ConfigError::Invalid("analyzer.columns must be > 0".into()));
        }
        finite_positive("analyzer.camera_hfov", self.analyzer.camera_hfov)?;
        finite_positive("planner.depth_scale", self.planner.depth_scale)?;
        finite_positive("planner.max_march", self.planner.max_march)?;
        finite_positive("planner.safety_margin", self.planner.safety_margin)?;
        if self.planner.heading_rays < 2 || self.planner.threat_rays < 2 {
            return Err(ConfigError::Invalid(
                "planner ray counts must be at least 2".into(),
            ));
        }
        for (name, v) in [
            ("elevation.step_min", self.elevation.step_min),
            ("elevation.step_max", self.elevation.step_max),
            ("elevation.curb_min", self.elevation.curb_min),
            ("elevation.dropoff", self.elevation.dropoff),
            ("elevation.obstacle_height", self.elevation.obstacle_height),
        ] {
            finite_positive(name, v)?;
        }
        if self.walkable_ids.is_empty() {
            return Err(ConfigError::Invalid(
                "walkable_ids must name at least one class".into(),
            ));
        }
        Ok(())
    }

    /// Merge CLI overrides on top of the file/default values and revalidate.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(port) = overrides.tcp_port {
            self.stream.tcp_port = port;
        }
        if let Some(cell_size) = overrides.cell_size {
            self.grid.cell_size = cell_size;
        }
        if let Some(grid_size) = overrides.grid_size {
            self.grid.grid_size = grid_size;
        }
        if let Some(max_distance) = overrides.max_distance {
            self.grid.max_distance = max_distance;
        }
        if let Some(ids) = &overrides.walkable_ids {
            self.walkable_ids = ids.clone();
        }
        self.validate()?;
        info!(
            target: "config",
            cell_size = self.grid.cell_size,
            grid_size = self.grid.grid_size,
            tcp_port = self.stream.tcp_port,
            walkable = self.walkable_ids.len(),
            "config_effective"
        );
        Ok(())
    }
}

/// CLI-sourced overrides, all optional. Kept separate from `Config` so the
/// binary can parse flags without constructing a partial config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tcp_port: Option<u16>,
    pub cell_size: Option<f32>,
    pub grid_size: Option<usize>,
    pub max_distance: Option<f32>,
    pub walkable_ids: Option<Vec<u8>>,
}

/// Parse a `--walkable-ids` style CSV list into class ids.
pub fn parse_walkable_csv(csv: &str) -> Result<Vec<u8>, ConfigError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| ConfigError::Invalid(format!("invalid walkable id '{s}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.grid.cell_size, 0.10);
        assert_eq!(cfg.grid.grid_size, 200);
        assert_eq!(cfg.grid.half_extent(), 10.0);
        assert_eq!(cfg.temporal.confidence_decay, 0.995);
        assert_eq!(cfg.temporal.min_confidence, 20);
        assert_eq!(cfg.processing.min_hit_count, 3);
        assert_eq!(cfg.stream.tcp_port, 8765);
        assert_eq!(cfg.analyzer.columns, 36);
        assert_eq!(cfg.planner.depth_scale, 10.0);
        assert_eq!(cfg.walkable_ids.len(), 20);
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_pathfinder__.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parses_partial_file_with_defaults_for_rest() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "walkable_ids = [21]\n[grid]\ncell_size = 0.05\n[stream]\ntcp_port = 9000\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.grid.cell_size, 0.05);
        assert_eq!(cfg.grid.grid_size, 200);
        assert_eq!(cfg.stream.tcp_port, 9000);
        assert_eq!(cfg.walkable_ids, vec![21]);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[grid]\ncell_size = 0.2\nfuture_knob = 1\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.grid.cell_size, 0.2);
    }

    #[test]
    fn malformed_file_is_fatal() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[grid\ncell_size = ").unwrap();
        let err = load_from(Some(tmp.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_grid_size_rejected() {
        let mut cfg = Config::default();
        cfg.grid.grid_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn non_finite_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.elevation.dropoff = f32::NAN;
        assert!(cfg.validate().is_err());
        let mut cfg = Config::default();
        cfg.grid.cell_size = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn decay_outside_unit_interval_rejected() {
        let mut cfg = Config::default();
        cfg.temporal.confidence_decay = 1.5;
        assert!(cfg.validate().is_err());
        cfg.temporal.confidence_decay = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_merge_and_revalidate() {
        let mut cfg = Config::default();
        let overrides = Overrides {
            tcp_port: Some(9001),
            cell_size: Some(0.2),
            grid_size: Some(100),
            max_distance: None,
            walkable_ids: Some(vec![21, 22]),
        };
        cfg.apply_overrides(&overrides).unwrap();
        assert_eq!(cfg.stream.tcp_port, 9001);
        assert_eq!(cfg.grid.cell_size, 0.2);
        assert_eq!(cfg.grid.grid_size, 100);
        assert_eq!(cfg.walkable_ids, vec![21, 22]);

        let bad = Overrides {
            grid_size: Some(0),
            ..Overrides::default()
        };
        assert!(cfg.apply_overrides(&bad).is_err());
    }

    #[test]
    fn walkable_csv_parses() {
        assert_eq!(
            parse_walkable_csv("101, 149,161").unwrap(),
            vec![101, 149, 161]
        );
        assert!(parse_walkable_csv("101,foo").is_err());
    }
}
