//! Size-budget eviction
//!
//! Deletes the least valuable file, ordered by `(priority, last modified)`,
//! until the directory fits the budget. Sizes are re-read from disk after
//! every deletion.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::PriorityLevel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Budget still exceeded because only protected (or undeletable) files remain
    pub over_budget: bool,
}

struct CachedFile {
    path: PathBuf,
    modified: SystemTime,
}

/// Files directly inside `dir` (sub-directories are ignored)
pub(super) fn list_files(dir: &Path) -> Vec<(PathBuf, u64, SystemTime)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read cache directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((entry.path(), meta.len(), modified))
        })
        .collect()
}

pub(super) fn directory_size(dir: &Path) -> u64 {
    list_files(dir).iter().map(|(_, len, _)| *len).sum()
}

pub(super) fn prune_directory(
    dir: &Path,
    budget: u64,
    priority_of: impl Fn(&Path) -> PriorityLevel,
) -> PruneReport {
    let bytes_before = directory_size(dir);
    let mut report = PruneReport {
        bytes_before,
        bytes_after: bytes_before,
        ..PruneReport::default()
    };
    let mut undeletable: HashSet<PathBuf> = HashSet::new();

    loop {
        let size = directory_size(dir);
        report.bytes_after = size;
        if size <= budget {
            break;
        }

        let victim = list_files(dir)
            .into_iter()
            .filter(|(path, _, _)| !undeletable.contains(path))
            .map(|(path, _, modified)| (priority_of(&path), CachedFile { path, modified }))
            .filter(|(priority, _)| priority.is_evictable())
            .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then(a.modified.cmp(&b.modified)));

        let Some((priority, file)) = victim else {
            warn!(
                "Cache is {} bytes over its {} byte budget with nothing evictable",
                size - budget,
                budget
            );
            report.over_budget = true;
            break;
        };

        match fs::remove_file(&file.path) {
            Ok(()) => {
                debug!("Pruned {} ({:?})", file.path.display(), priority);
                report.deleted.push(file.path);
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", file.path.display(), e);
                undeletable.insert(file.path);
            }
        }
    }

    if !report.deleted.is_empty() {
        info!(
            "Pruned {} files from cache ({} -> {} bytes)",
            report.deleted.len(),
            report.bytes_before,
            report.bytes_after
        );
    }
    report
}
