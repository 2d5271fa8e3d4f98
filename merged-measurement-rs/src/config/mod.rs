//! Configuration types for merged measurement detection.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Thresholds for finding close measurement pairs and predicting merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePairConfig {
    /// Maximum distance between two simultaneous detections to form a pair
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,

    /// Both detections of a pair must have an area strictly above this
    #[serde(default = "default_min_area")]
    pub min_area: f64,

    /// Bounding circle radius as a fraction of half the pair separation
    #[serde(default = "default_circle_scale")]
    pub circle_scale: f64,

    /// Radius multiplier for counting nearby detections at the next timestamp
    #[serde(default = "default_nearby_factor")]
    pub nearby_factor: f64,
}

fn default_max_distance() -> f64 {
    20.0
}

fn default_min_area() -> f64 {
    5.0
}

fn default_circle_scale() -> f64 {
    0.8
}

fn default_nearby_factor() -> f64 {
    2.0
}

impl Default for ClosePairConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            min_area: default_min_area(),
            circle_scale: default_circle_scale(),
            nearby_factor: default_nearby_factor(),
        }
    }
}

/// Parameters for linking detections into tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Maximum distance from a track sample to link a new detection
    #[serde(default = "default_link_distance")]
    pub link_distance: f64,

    /// Maximum time since a track's last sample for it to be extended
    #[serde(default = "default_max_time_gap")]
    pub max_time_gap: f64,
}

fn default_link_distance() -> f64 {
    15.0
}

fn default_max_time_gap() -> f64 {
    4.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            link_distance: default_link_distance(),
            max_time_gap: default_max_time_gap(),
        }
    }
}

/// Region of interest applied before detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Drop detections outside `vertices` when true
    #[serde(default = "default_region_enabled")]
    pub enabled: bool,

    /// Polygon vertices (x, y), implicitly closed
    #[serde(default = "default_region_vertices")]
    pub vertices: Vec<[f64; 2]>,
}

fn default_region_enabled() -> bool {
    true
}

fn default_region_vertices() -> Vec<[f64; 2]> {
    vec![
        [100.0, 0.0],
        [100.0, -40.0],
        [0.0, -80.0],
        [-50.0, -110.0],
        [-90.0, -120.0],
        [-105.0, -110.0],
        [-50.0, -60.0],
        [-25.0, -20.0],
        [0.0, 0.0],
    ]
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            enabled: default_region_enabled(),
            vertices: default_region_vertices(),
        }
    }
}

/// What to produce for sessions that contain merged measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write merge and track CSV files
    #[serde(default = "default_write_csv")]
    pub write_csv: bool,

    /// Render one PNG per merged measurement plus a session overview
    #[serde(default)]
    pub plot: bool,

    /// Frames before the pair's frame drawn as context in a merge plot
    #[serde(default = "default_frames_before")]
    pub frames_before: usize,

    /// Frames from the pair's frame onward drawn in a merge plot
    #[serde(default = "default_frames_after")]
    pub frames_after: usize,

    /// Plot width in pixels
    #[serde(default = "default_plot_width")]
    pub plot_width: u32,

    /// Plot height in pixels
    #[serde(default = "default_plot_height")]
    pub plot_height: u32,
}

fn default_write_csv() -> bool {
    true
}

fn default_frames_before() -> usize {
    30
}

fn default_frames_after() -> usize {
    10
}

fn default_plot_width() -> u32 {
    1100
}

fn default_plot_height() -> u32 {
    720
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_csv: default_write_csv(),
            plot: false,
            frames_before: default_frames_before(),
            frames_after: default_frames_after(),
            plot_width: default_plot_width(),
            plot_height: default_plot_height(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub close_pairs: ClosePairConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub region: RegionConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
