//! Per-folder polling loop: scan, dedup-check, upload, clean up.

use crate::models::{CandidateFile, FolderTask};
use crate::remap;
use crate::scanner;
use anyhow::Context;
use archive::{Archive, MediaTypes, UploadOutcome};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const TICK_INTERVAL: Duration = Duration::from_secs(30);
pub const SETTLE_TIME: Duration = Duration::from_secs(5);

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub candidates: usize,
    pub accepted: usize,
    pub uploaded: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// Candidates the archive declined up front.
    pub skipped: usize,
    pub album_failures: usize,
}

pub struct FolderWatcher {
    task: Arc<FolderTask>,
    archive: Arc<dyn Archive>,
    media_types: Arc<MediaTypes>,
    interval: Duration,
    settle: Duration,
}

impl FolderWatcher {
    pub fn new(task: FolderTask, archive: Arc<dyn Archive>, media_types: Arc<MediaTypes>) -> Self {
        Self {
            task: Arc::new(task),
            archive,
            media_types,
            interval: TICK_INTERVAL,
            settle: SETTLE_TIME,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Sleeps, ticks, repeats. Cancellation interrupts the sleep; a tick that
    /// has started always runs to completion.
    pub async fn run(self, shutdown: CancellationToken) {
        let root = self.task.root.display().to_string();
        info!(folder = %root, "started folder watch service");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            info!(folder = %root, "tick start");
            match self.tick().await {
                Ok(report) => {
                    if report.candidates > 0 {
                        info!(folder = %root, ?report, "tick finished");
                    }
                }
                Err(e) => error!(folder = %root, error = ?e, "failed to run tick"),
            }
            info!(folder = %root, "tick end");
        }
        info!(folder = %root, "stopped folder watch service");
    }

    /// One scan → dedup-check → upload → cleanup pass. An error aborts the
    /// rest of the tick; files already handled stay handled.
    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        let candidates = self.scan().await?;
        let mut report = TickReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let paths: Vec<PathBuf> = candidates.iter().map(|c| c.path.clone()).collect();
        let offered: HashSet<&Path> = paths.iter().map(PathBuf::as_path).collect();
        let mut seen = HashSet::new();
        let accepted: Vec<PathBuf> = self
            .archive
            .bulk_upload_check(&paths)
            .await
            .context("bulk upload check")?
            .into_iter()
            .filter(|p| offered.contains(p.as_path()) && seen.insert(p.clone()))
            .collect();
        report.accepted = accepted.len();

        if !accepted.is_empty() {
            info!(folder = %self.task.root.display(), count = accepted.len(), "uploading files");
        }
        for file in &accepted {
            self.upload_one(file, &mut report).await?;
        }

        for candidate in candidates.iter().filter(|c| !seen.contains(&c.path)) {
            report.skipped += 1;
            remove(&candidate.path).await;
        }
        Ok(report)
    }

    async fn scan(&self) -> anyhow::Result<Vec<CandidateFile>> {
        let task = Arc::clone(&self.task);
        let media_types = Arc::clone(&self.media_types);
        let settle = self.settle;
        tokio::task::spawn_blocking(move || {
            scanner::scan(&task, &media_types, settle, SystemTime::now())
        })
        .await
        .context("scan task panicked")?
    }

    async fn upload_one(&self, file: &Path, report: &mut TickReport) -> anyhow::Result<()> {
        let name = file.display();
        remap::remap_timestamps(file, &self.task.remap_rules);

        info!(file = %name, "uploading");
        let outcome = self
            .archive
            .upload(file)
            .await
            .with_context(|| format!("uploading {name}"))?;

        match outcome {
            UploadOutcome::Duplicate => {
                info!(file = %name, "already exists in archive");
                report.duplicates += 1;
                remove(file).await;
            }
            UploadOutcome::Accepted(asset_id) => {
                info!(file = %name, asset = %asset_id, "upload ok");
                report.uploaded += 1;
                remove(file).await;
                if let Some(album) = &self.task.album_id {
                    if let Err(e) = self.archive.add_to_album(album, &[asset_id]).await {
                        warn!(file = %name, album = %album, error = %e, "failed to add asset to album");
                        report.album_failures += 1;
                    }
                }
            }
            UploadOutcome::Rejected => {
                warn!(file = %name, "archive neither accepted nor flagged the upload");
                report.rejected += 1;
                remove(file).await;
            }
        }
        Ok(())
    }
}

async fn remove(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(file = %path.display(), error = %e, "failed to delete file");
    }
}
