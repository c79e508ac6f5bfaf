use crate::checksum;
use crate::multipart::MultipartBuilder;
use crate::{Archive, ArchiveError, MediaTypes, UploadOutcome};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use url::Url;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEVICE_ID: &str = "WEB";

#[derive(Clone)]
pub struct ImmichConfig {
    /// Server root, e.g. `https://photos.example.com`. The `/api/` prefix is added here.
    pub url: String,
    pub api_key: String,
}

/// Stateless HTTP façade over the archive's REST API.
#[derive(Clone)]
pub struct ImmichClient {
    client: Client,
    api: Url,
    api_key: Arc<str>,
}

impl std::fmt::Debug for ImmichClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmichClient")
            .field("api", &self.api.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct BulkCheckRequest {
    pub assets: Vec<BulkCheckItem>,
}

#[derive(Debug, Serialize)]
pub struct BulkCheckItem {
    pub checksum: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkCheckResponse {
    pub results: Vec<BulkCheckResult>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCheckResult {
    pub id: String,
    pub action: String,
}

#[derive(Debug, Deserialize)]
struct MediaTypesResponse {
    #[serde(default)]
    image: Vec<String>,
    #[serde(default)]
    video: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AlbumAssets<'a> {
    ids: &'a [String],
}

impl ImmichClient {
    pub fn new(cfg: ImmichConfig) -> Result<Self, ArchiveError> {
        let api = Url::parse(&cfg.url)?.join("/api/")?;
        Ok(Self {
            client: Client::new(),
            api,
            api_key: cfg.api_key.into(),
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api
    }

    fn endpoint(&self, path: &str) -> Result<Url, ArchiveError> {
        Ok(self.api.join(path)?)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, self.api_key.as_ref())
    }

    /// Fetches the extensions the server accepts as image or video assets.
    pub async fn media_types(&self) -> Result<MediaTypes, ArchiveError> {
        let url = self.endpoint("server/media-types")?;
        let resp = self.authorized(self.client.get(url)).send().await?;
        let parsed: MediaTypesResponse = parse_json(resp).await?;
        Ok(MediaTypes::new(parsed.image.iter().chain(parsed.video.iter())))
    }

    async fn submit_bulk_check(
        &self,
        request: &BulkCheckRequest,
    ) -> Result<BulkCheckResponse, ArchiveError> {
        let url = self.endpoint("assets/bulk-upload-check")?;
        let resp = self
            .authorized(self.client.post(url))
            .json(request)
            .send()
            .await?;
        parse_json(resp).await
    }
}

/// Pairs each file with a fresh correlation id. The map only lives for one
/// round trip.
pub fn correlate(files: &[PathBuf]) -> Vec<(String, PathBuf)> {
    files
        .iter()
        .map(|f| (uuid::Uuid::new_v4().to_string(), f.clone()))
        .collect()
}

/// Resolves `accept` results back to files, in response order. Unknown ids and
/// repeats of an id are dropped, so the result is a subset of the request.
pub fn accepted_files(
    mut ids: HashMap<String, PathBuf>,
    response: BulkCheckResponse,
) -> Vec<PathBuf> {
    response
        .results
        .into_iter()
        .filter(|r| r.action.eq_ignore_ascii_case("accept"))
        .filter_map(|r| ids.remove(&r.id))
        .collect()
}

#[async_trait::async_trait]
impl Archive for ImmichClient {
    async fn bulk_upload_check(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, ArchiveError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let entries = correlate(files);
        let paths: Vec<PathBuf> = entries.iter().map(|(_, p)| p.clone()).collect();
        let checksums = tokio::task::spawn_blocking(move || checksum::sha1_files(&paths))
            .await
            .map_err(|e| ArchiveError::Encode(e.to_string()))??;

        let request = BulkCheckRequest {
            assets: entries
                .iter()
                .zip(checksums)
                .map(|((id, _), checksum)| BulkCheckItem {
                    checksum,
                    id: id.clone(),
                })
                .collect(),
        };
        debug!(count = request.assets.len(), "submitting bulk upload check");
        let response = self.submit_bulk_check(&request).await?;
        Ok(accepted_files(entries.into_iter().collect(), response))
    }

    async fn upload(&self, file: &Path) -> Result<UploadOutcome, ArchiveError> {
        let form = upload_form(file)?;
        let body = tokio::task::spawn_blocking(move || form.build())
            .await
            .map_err(|e| ArchiveError::Encode(e.to_string()))??;
        let (content_type, bytes) = body.into_parts();

        let url = self.endpoint("assets")?;
        let resp = self
            .authorized(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let parsed: Value = parse_json(resp).await?;
        if !parsed.is_object() {
            return Err(ArchiveError::Malformed(format!(
                "upload response is not an object: {parsed}"
            )));
        }
        Ok(UploadOutcome::from_response(&parsed))
    }

    async fn add_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<Value, ArchiveError> {
        let url = self.endpoint(&format!("albums/{album_id}/assets"))?;
        let resp = self
            .authorized(self.client.put(url))
            .json(&AlbumAssets { ids: asset_ids })
            .send()
            .await?;
        parse_json(resp).await
    }
}

/// Builds the asset form for `file` from its name and timestamps. The file
/// contents are read later, when the form is built.
pub fn upload_form(file: &Path) -> Result<MultipartBuilder, ArchiveError> {
    let meta = fs::metadata(file).map_err(|e| ArchiveError::io(file, e))?;
    let modified = meta.modified().map_err(|e| ArchiveError::io(file, e))?;
    // Not every filesystem records a birth time, and a remapped mtime can
    // predate it; creation never comes after modification.
    let created = meta
        .created()
        .ok()
        .filter(|c| *c <= modified)
        .unwrap_or(modified);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::Encode(format!("{file:?} has no file name")))?;

    Ok(MultipartBuilder::new()
        .text("deviceAssetId", device_asset_id(&name, created))
        .text("deviceId", DEVICE_ID)
        .text("fileCreatedAt", iso_millis(created))
        .text("fileModifiedAt", iso_millis(modified))
        .text("isFavorite", "false")
        .text("duration", "0:00:00.000000")
        .file("assetData", &name, file))
}

pub fn device_asset_id(name: &str, created: SystemTime) -> String {
    let millis = DateTime::<Utc>::from(created).timestamp_millis();
    format!("web-{name}-{millis}")
}

/// ISO-8601 UTC with exactly millisecond precision.
pub fn iso_millis(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ArchiveError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
        return Err(ArchiveError::Status {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ArchiveError::Malformed(e.to_string()))
}
