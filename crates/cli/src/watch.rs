use anyhow::{Context, Result};
use archive::client::{ImmichClient, ImmichConfig};
use archive::{Archive, MediaTypes};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uploader_core::config::AppConfig;
use uploader_core::models::FolderTask;
use uploader_core::watcher::FolderWatcher;

/// Compiles every configured folder; one bad entry fails startup.
pub fn build_tasks(cfg: &AppConfig) -> Result<Vec<FolderTask>> {
    cfg.folders
        .iter()
        .enumerate()
        .map(|(i, folder)| {
            FolderTask::from_config(folder).with_context(|| format!("folder #{i} in config"))
        })
        .collect()
}

/// Builds the archive client and fetches the media types it accepts.
pub async fn connect(cfg: &AppConfig) -> Result<(ImmichClient, MediaTypes)> {
    let client = ImmichClient::new(ImmichConfig {
        url: cfg.immich_url.clone(),
        api_key: cfg.api_key.clone(),
    })
    .with_context(|| format!("invalid archive url {:?}", cfg.immich_url))?;

    info!(url = %client.api_url(), "connecting");
    let media_types = client
        .media_types()
        .await
        .context("resolving supported media types")?;
    info!(count = media_types.len(), "supported file types");
    Ok((client, media_types))
}

/// Starts one watcher task per folder.
pub fn spawn_watchers(
    tasks: Vec<FolderTask>,
    archive: Arc<dyn Archive>,
    media_types: Arc<MediaTypes>,
    shutdown: &CancellationToken,
) -> JoinSet<()> {
    let mut set = JoinSet::new();
    for task in tasks {
        let watcher = FolderWatcher::new(task, Arc::clone(&archive), Arc::clone(&media_types));
        set.spawn(watcher.run(shutdown.clone()));
    }
    set
}

/// Runs all folder watchers until `shutdown` is cancelled.
pub async fn watch_folders(cfg: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let tasks = build_tasks(&cfg)?;
    let (client, media_types) = connect(&cfg).await?;

    let mut set = spawn_watchers(tasks, Arc::new(client), Arc::new(media_types), &shutdown);
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "folder watcher task failed");
        }
    }
    info!("folder watchers have been halted");
    Ok(())
}
