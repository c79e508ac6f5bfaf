//! Walks a watched folder and picks out settled media files.

use crate::models::{CandidateFile, FolderTask};
use anyhow::Context;
use archive::MediaTypes;
use std::fs;
use std::io;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Lists candidates under `task.root`: regular files whose extension the
/// archive accepts, whose name matches a pattern, and which have not been
/// modified for at least `settle`. Any I/O error fails the whole scan.
pub fn scan(
    task: &FolderTask,
    media_types: &MediaTypes,
    settle: Duration,
    now: SystemTime,
) -> anyhow::Result<Vec<CandidateFile>> {
    let mut walker = WalkDir::new(&task.root).sort_by_file_name();
    if task.max_depth > 0 {
        walker = walker.max_depth(task.max_depth);
    }

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", task.root.display()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !media_types.accepts_file_name(&name) || !task.matches_file_name(&name) {
            continue;
        }

        // Follows symlinks, so a link to a regular file counts as one and a
        // dangling link is no file at all.
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta
            .modified()
            .with_context(|| format!("mtime of {}", path.display()))?;
        if !is_settled(modified, now, settle) {
            continue;
        }

        candidates.push(CandidateFile {
            path: path.to_path_buf(),
            modified,
            size: meta.len(),
        });
    }
    Ok(candidates)
}

/// Modified at least `settle` before `now`. Future mtimes never settle.
pub fn is_settled(modified: SystemTime, now: SystemTime, settle: Duration) -> bool {
    now.duration_since(modified)
        .map(|age| age >= settle)
        .unwrap_or(false)
}
