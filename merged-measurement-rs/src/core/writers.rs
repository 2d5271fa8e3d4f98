//! CSV export of detection results.
//!
//! This module provides functions for writing:
//! - Merged measurements, one row per event
//! - Track samples, one row per sample
//! - Track summaries, one row per track

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::processors::merging::MergeMeasurement;
use crate::processors::tracking::{Track, TrackId};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Opens a CSV writer on a fresh file, creating parent directories.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = create_csv_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

fn track_id_field(id: Option<TrackId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// Write merged measurements to CSV.
///
/// Columns: previous timestamp, both source points with areas, their
/// separation, current timestamp, merged point with area, and the owning
/// track of each point (empty when unknown).
///
/// # Example
///
/// ```no_run
/// use merged_measurement::core::writers::write_merges_csv;
/// use std::path::Path;
///
/// write_merges_csv(Path::new("merges.csv"), &[]).unwrap();
/// ```
pub fn write_merges_csv(path: &Path, merges: &[MergeMeasurement]) -> Result<()> {
    const HEADER: [&str; 15] = [
        "prev_timestamp",
        "x1",
        "y1",
        "area1",
        "x2",
        "y2",
        "area2",
        "distance_between",
        "timestamp",
        "x",
        "y",
        "area",
        "track1",
        "track2",
        "track_merged",
    ];

    let rows = merges.iter().map(|m| {
        let [t1, t2, t3] = m.track_ids.unwrap_or([None, None, None]);
        let (a, b, c) = (&m.pair.first.detection, &m.pair.second.detection, &m.merged.detection);
        vec![
            format!("{:.6}", m.previous_timestamp()),
            format!("{:.6}", a.x),
            format!("{:.6}", a.y),
            format!("{:.6}", a.area),
            format!("{:.6}", b.x),
            format!("{:.6}", b.y),
            format!("{:.6}", b.area),
            format!("{:.6}", m.pair.separation),
            format!("{:.6}", m.current_timestamp()),
            format!("{:.6}", c.x),
            format!("{:.6}", c.y),
            format!("{:.6}", c.area),
            track_id_field(t1),
            track_id_field(t2),
            track_id_field(t3),
        ]
    });

    write_rows(path, &HEADER, rows)
}

/// Write every track sample to CSV with columns `track_id,timestamp,x,y`.
pub fn write_tracks_csv(path: &Path, tracks: &[Track]) -> Result<()> {
    let rows = tracks.iter().flat_map(|track| {
        track.samples.iter().map(move |s| {
            vec![
                track.id.to_string(),
                format!("{:.6}", s.timestamp),
                format!("{:.6}", s.x),
                format!("{:.6}", s.y),
            ]
        })
    });

    write_rows(path, &["track_id", "timestamp", "x", "y"], rows)
}

/// Write one summary row per track: sample count, time span, displacement
/// and path length.
pub fn write_track_summary_csv(path: &Path, tracks: &[Track]) -> Result<()> {
    let rows = tracks.iter().map(|track| {
        let first = track.samples.first().map(|s| s.timestamp).unwrap_or_default();
        let last = track.last().map(|s| s.timestamp).unwrap_or_default();
        vec![
            track.id.to_string(),
            track.len().to_string(),
            format!("{:.6}", first),
            format!("{:.6}", last),
            format!("{:.6}", track.displacement()),
            format!("{:.6}", track.path_length()),
        ]
    });

    write_rows(
        path,
        &["track_id", "samples", "first_timestamp", "last_timestamp", "displacement", "path_length"],
        rows,
    )
}
