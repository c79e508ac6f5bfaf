//! Remote archive access: checksums, multipart bodies and the HTTP client.

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod checksum;
pub mod client;
pub mod multipart;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What the archive did with an uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new asset was created with this id.
    Accepted(String),
    /// The archive already holds this content.
    Duplicate,
    /// Neither marker was present in the response.
    Rejected,
}

impl UploadOutcome {
    /// Classifies an upload response body. The duplicate marker wins over an id,
    /// since the archive echoes the existing asset id on duplicates.
    pub fn from_response(body: &Value) -> Self {
        let duplicate = body
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("duplicate"))
            .unwrap_or(false);
        if duplicate {
            return UploadOutcome::Duplicate;
        }
        match body.get("id").and_then(Value::as_str) {
            Some(id) => UploadOutcome::Accepted(id.to_string()),
            None => UploadOutcome::Rejected,
        }
    }
}

/// Lower-cased file extensions (with the leading dot) the archive accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTypes {
    extensions: HashSet<String>,
}

impl MediaTypes {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_lowercase())
    }

    /// Membership test on a file name: everything from the last dot onwards,
    /// lower-cased. Names without a dot never match.
    pub fn accepts_file_name(&self, name: &str) -> bool {
        match name.rfind('.') {
            Some(idx) => self.contains(&name[idx..]),
            None => false,
        }
    }
}

/// The operations the folder watcher needs from the remote archive.
#[async_trait::async_trait]
pub trait Archive: Send + Sync {
    /// Returns the subset of `files` the archive wants uploaded.
    async fn bulk_upload_check(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, ArchiveError>;

    async fn upload(&self, file: &Path) -> Result<UploadOutcome, ArchiveError>;

    async fn add_to_album(&self, album_id: &str, asset_ids: &[String])
        -> Result<Value, ArchiveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_status_wins_over_id() {
        let body = json!({"id": "abc", "status": "DUPLICATE"});
        assert_eq!(UploadOutcome::from_response(&body), UploadOutcome::Duplicate);
    }

    #[test]
    fn id_without_duplicate_is_accepted() {
        assert_eq!(
            UploadOutcome::from_response(&json!({"id": "abc"})),
            UploadOutcome::Accepted("abc".into())
        );
        assert_eq!(
            UploadOutcome::from_response(&json!({"id": "abc", "status": "created"})),
            UploadOutcome::Accepted("abc".into())
        );
    }

    #[test]
    fn empty_response_is_rejected() {
        assert_eq!(
            UploadOutcome::from_response(&json!({"message": "nope"})),
            UploadOutcome::Rejected
        );
    }

    #[test]
    fn media_types_match_last_extension_case_insensitively() {
        let types = MediaTypes::new([".png", ".JPG"]);
        assert!(types.accepts_file_name("VRChat_shot.PNG"));
        assert!(types.accepts_file_name("archive.tar.jpg"));
        assert!(!types.accepts_file_name("shot.png.txt"));
        assert!(!types.accepts_file_name("png"));
        assert_eq!(types.len(), 2);
    }
}
