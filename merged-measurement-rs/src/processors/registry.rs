//! Bookkeeping of sessions known to contain merged measurements.
//!
//! The batch runner records a session's file name once it has produced at
//! least one merge, and skips recorded sessions on later runs. The registry
//! is injected so the detection pipeline never touches it directly.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while reading or updating a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update registry '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Set of processed session file names.
pub trait ProcessedRegistry {
    fn contains(&self, name: &str) -> bool;

    /// Record `name`. Returns `false` if it was already recorded.
    fn record(&mut self, name: &str) -> Result<bool>;

    /// All recorded names.
    fn names(&self) -> Vec<String>;
}

/// Registry kept only for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    names: HashSet<String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessedRegistry for MemoryRegistry {
    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn record(&mut self, name: &str) -> Result<bool> {
        Ok(self.names.insert(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

/// Registry stored as a text file with one file name per line.
///
/// New names are appended; existing lines are never rewritten.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
    names: Vec<String>,
}

impl FileRegistry {
    /// Open a registry file, treating a missing file as empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let names = if path.exists() {
            fs::read_to_string(&path)
                .map_err(|source| RegistryError::Read {
                    path: path.clone(),
                    source,
                })?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProcessedRegistry for FileRegistry {
    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn record(&mut self, name: &str) -> Result<bool> {
        if self.contains(name) {
            log::info!("File {} already written to {}", name, self.path.display());
            return Ok(false);
        }

        let write_err = |source| RegistryError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{}", name).map_err(write_err)?;

        self.names.push(name.to_string());
        Ok(true)
    }

    fn names(&self) -> Vec<String> {
        self.names.clone()
    }
}

/// Find recorded sessions under `root`.
///
/// Looks for `*.json` files in each immediate subdirectory of `root` whose
/// file name is in the registry. Results are sorted by path.
pub fn collect_recorded_sessions(root: &Path, registry: &dyn ProcessedRegistry) -> Vec<PathBuf> {
    let mut subdirs: Vec<PathBuf> = fs::read_dir(root)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    let mut found = Vec::new();
    for dir in subdirs {
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_json(path))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| registry.contains(n))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        found.extend(files);
    }
    found
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_registry() {
        let mut registry = MemoryRegistry::new();
        assert!(!registry.contains("a.json"));
        assert!(registry.record("b.json").unwrap());
        assert!(registry.record("a.json").unwrap());
        assert!(!registry.record("a.json").unwrap());
        assert_eq!(registry.names(), vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_file_registry_appends_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("merged_measurements.txt");

        let mut registry = FileRegistry::open(&path).unwrap();
        assert!(registry.names().is_empty());
        assert!(registry.record("rosbag_1.json").unwrap());
        assert!(registry.record("rosbag_2.json").unwrap());
        assert!(!registry.record("rosbag_1.json").unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "rosbag_1.json\nrosbag_2.json\n");

        let reopened = FileRegistry::open(&path).unwrap();
        assert!(reopened.contains("rosbag_2.json"));
        assert_eq!(reopened.names().len(), 2);
    }

    #[test]
    fn test_collect_recorded_sessions() {
        let dir = TempDir::new().unwrap();
        let day1 = dir.path().join("data_aug_18-19");
        let day2 = dir.path().join("data_aug_22-23");
        fs::create_dir_all(&day1).unwrap();
        fs::create_dir_all(&day2).unwrap();
        fs::write(day1.join("a.json"), "{}").unwrap();
        fs::write(day1.join("b.json"), "{}").unwrap();
        fs::write(day2.join("c.json"), "{}").unwrap();
        fs::write(day2.join("a.txt"), "").unwrap();
        fs::write(dir.path().join("c.json"), "{}").unwrap();

        let mut registry = MemoryRegistry::new();
        registry.record("a.json").unwrap();
        registry.record("c.json").unwrap();

        let found = collect_recorded_sessions(dir.path(), &registry);
        assert_eq!(found, vec![day1.join("a.json"), day2.join("c.json")]);
    }
}
