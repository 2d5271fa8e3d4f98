//! Command-line interface for merged measurement detection.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::processors::pipeline::{self, BatchOptions, BatchOutcome, MergeDetector};
use crate::processors::registry::{self, FileRegistry, MemoryRegistry, ProcessedRegistry};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "merged-measurement")]
#[command(about = "Detect merged radar measurements in clustered detections", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect merged measurements in JSON session files
    Detect {
        /// Session files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory for CSVs and plots
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Text file listing sessions with merged measurements
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Process sessions even if the registry lists them
        #[arg(long)]
        reprocess: bool,
        /// Keep detections outside the region of interest
        #[arg(long)]
        no_region: bool,
        /// Render one PNG per merged measurement
        #[arg(long)]
        plot: bool,
        #[command(flatten)]
        thresholds: Thresholds,
    },

    /// Re-run sessions listed in a registry file
    Recorded {
        /// Root directory with one subdirectory per recording period
        root: PathBuf,
        /// Text file listing sessions with merged measurements
        #[arg(long)]
        registry: PathBuf,
        /// Output directory for CSVs and plots
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Render one PNG per merged measurement
        #[arg(long)]
        plot: bool,
    },

    /// Export tracks for a single session
    Tracks {
        /// Session file
        input: PathBuf,
        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Keep detections outside the region of interest
        #[arg(long)]
        no_region: bool,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Threshold overrides shared by detection commands.
#[derive(clap::Args)]
struct Thresholds {
    /// Maximum distance between a close measurement pair
    #[arg(long)]
    max_distance: Option<f64>,
    /// Minimum area of each detection in a close pair
    #[arg(long)]
    min_area: Option<f64>,
    /// Maximum distance for linking a detection to a track
    #[arg(long)]
    link_distance: Option<f64>,
    /// Maximum time gap for extending a track
    #[arg(long)]
    max_time_gap: Option<f64>,
}

impl Thresholds {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.max_distance {
            config.close_pairs.max_distance = v;
        }
        if let Some(v) = self.min_area {
            config.close_pairs.min_area = v;
        }
        if let Some(v) = self.link_distance {
            config.tracking.link_distance = v;
        }
        if let Some(v) = self.max_time_gap {
            config.tracking.max_time_gap = v;
        }
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            format!("{}...", value.chars().take(34).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Detect {
            inputs,
            output_dir,
            registry,
            reprocess,
            no_region,
            plot,
            thresholds,
        } => {
            let mut config = config;
            thresholds.apply(&mut config);
            if no_region {
                config.region.enabled = false;
            }
            config.output.plot |= plot;
            cmd_detect(&inputs, output_dir, registry.as_deref(), reprocess, &config);
        }
        Commands::Recorded {
            root,
            registry,
            output_dir,
            plot,
        } => {
            let mut config = config;
            config.output.plot |= plot;
            cmd_recorded(&root, &registry, output_dir, &config);
        }
        Commands::Tracks {
            input,
            output_dir,
            no_region,
        } => {
            let mut config = config;
            if no_region {
                config.region.enabled = false;
            }
            cmd_tracks(&input, output_dir, &config);
        }
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    }
}

fn open_registry(path: Option<&Path>) -> Box<dyn ProcessedRegistry> {
    match path {
        Some(path) => match FileRegistry::open(path) {
            Ok(registry) => {
                info!(
                    "Registry {} lists {} sessions",
                    registry.path().display(),
                    registry.names().len()
                );
                Box::new(registry)
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => Box::new(MemoryRegistry::new()),
    }
}

fn run_batch(
    paths: &[PathBuf],
    output_dir: Option<PathBuf>,
    reprocess: bool,
    registry: &mut dyn ProcessedRegistry,
    config: &PipelineConfig,
) -> BatchOutcome {
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} sessions {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let options = BatchOptions {
        output_dir,
        reprocess,
    };

    let progress = |_: &Path| pb.inc(1);
    let outcome = match pipeline::process_batch_with_progress(paths, config, &options, registry, progress) {
        Ok(outcome) => outcome,
        Err(e) => {
            pb.finish_and_clear();
            error!("Batch failed: {:#}", e);
            std::process::exit(1);
        }
    };
    pb.finish_and_clear();

    for session in &outcome.processed {
        println!(
            "{}: {} frames, {} close pairs, {} ambiguous, {} merged measurements",
            session.name, session.frames, session.close_pairs, session.ambiguous, session.merges
        );
    }
    for (path, message) in &outcome.failed {
        eprintln!("{}: {}", path.display(), message);
    }

    outcome
}

fn cmd_detect(
    inputs: &[PathBuf],
    output_dir: Option<PathBuf>,
    registry_path: Option<&Path>,
    reprocess: bool,
    config: &PipelineConfig,
) {
    let start = Instant::now();

    let paths = pipeline::collect_session_files(inputs);
    if paths.is_empty() {
        error!("No session files found in {:?}", inputs);
        std::process::exit(1);
    }

    println!("Detecting merged measurements...");
    println!("Sessions: {}", paths.len());
    println!("Parameters:");
    println!("  max_distance: {}", config.close_pairs.max_distance);
    println!("  min_area: {}", config.close_pairs.min_area);
    println!("  link_distance: {}", config.tracking.link_distance);
    println!("  max_time_gap: {}", config.tracking.max_time_gap);
    println!("  region filter: {}", config.region.enabled);

    let mut registry = open_registry(registry_path);
    let outcome = run_batch(&paths, output_dir.clone(), reprocess, registry.as_mut(), config);

    print_summary(
        "Merged Measurement Detection Complete",
        &[
            ("Sessions processed", outcome.processed.len().to_string()),
            ("Sessions skipped", outcome.skipped.len().to_string()),
            ("Sessions failed", outcome.failed.len().to_string()),
            ("Merged measurements", outcome.total_merges().to_string()),
            ("Newly recorded", outcome.recorded.to_string()),
            (
                "Output directory",
                output_dir
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if !outcome.failed.is_empty() && outcome.processed.is_empty() {
        std::process::exit(1);
    }
}

fn cmd_recorded(root: &Path, registry_path: &Path, output_dir: Option<PathBuf>, config: &PipelineConfig) {
    let start = Instant::now();

    let mut registry = open_registry(Some(registry_path));
    let paths = registry::collect_recorded_sessions(root, registry.as_ref());
    if paths.is_empty() {
        warn!(
            "No sessions under {} are listed in {}",
            root.display(),
            registry_path.display()
        );
        return;
    }

    println!("Re-running {} recorded sessions...", paths.len());
    let outcome = run_batch(&paths, output_dir, true, registry.as_mut(), config);

    print_summary(
        "Recorded Sessions Complete",
        &[
            ("Root", root.display().to_string()),
            ("Sessions processed", outcome.processed.len().to_string()),
            ("Sessions failed", outcome.failed.len().to_string()),
            ("Merged measurements", outcome.total_merges().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_tracks(input: &Path, output_dir: Option<PathBuf>, config: &PipelineConfig) {
    use crate::core::{loaders, writers};

    let start = Instant::now();

    let effective_output_dir = output_dir.unwrap_or_else(|| {
        input.parent().unwrap_or(Path::new(".")).to_path_buf()
    });
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "session".to_string());

    let spinner = create_spinner("Building tracks...");

    let raw = match loaders::load_session_json(input) {
        Ok(set) => set,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to load {}: {}", input.display(), e);
            std::process::exit(1);
        }
    };

    let detector = MergeDetector::new(config.clone());
    let set = detector.preprocess(&raw);
    let tracks = crate::processors::tracking::build_tracks(&set, &config.tracking);

    let tracks_path = effective_output_dir.join(format!("{}_tracks.csv", stem));
    let summary_path = effective_output_dir.join(format!("{}_track_summary.csv", stem));

    let written = writers::write_tracks_csv(&tracks_path, &tracks)
        .and_then(|_| writers::write_track_summary_csv(&summary_path, &tracks));

    spinner.finish_and_clear();

    if let Err(e) = written {
        error!("Failed to write tracks: {}", e);
        std::process::exit(1);
    }

    let multi_sample = tracks.iter().filter(|t| t.len() > 1).count();

    print_summary(
        "Track Export Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Detections", set.detection_count().to_string()),
            ("Tracks", tracks.len().to_string()),
            ("Tracks with >1 sample", multi_sample.to_string()),
            ("Tracks CSV", tracks_path.display().to_string()),
            ("Summary CSV", summary_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Wrote configuration to {}", path.display()),
        Err(e) => {
            error!("Failed to write config to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
