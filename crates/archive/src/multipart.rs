//! multipart/form-data body construction.
//!
//! The whole body is materialised in memory; uploads are single media files,
//! so there is no need to stream.

use crate::ArchiveError;
use std::fs;
use std::path::PathBuf;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone)]
enum Content {
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    filename: Option<String>,
    content: Content,
}

/// Collects parts in order and frames them on [`MultipartBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct MultipartBuilder {
    parts: Vec<Part>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: None,
            content: Content::Text(value.into()),
        });
        self
    }

    pub fn bytes(mut self, name: &str, filename: Option<&str>, data: Vec<u8>) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: filename.map(str::to_string),
            content: Content::Bytes(data),
        });
        self
    }

    /// The file is read when the body is built, not now.
    pub fn file(mut self, name: &str, filename: &str, path: impl Into<PathBuf>) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            content: Content::File(path.into()),
        });
        self
    }

    pub fn build(self) -> Result<MultipartBody, ArchiveError> {
        let boundary = new_boundary();
        let mut out = Vec::new();
        for part in self.parts {
            out.extend_from_slice(b"--");
            out.extend_from_slice(boundary.as_bytes());
            out.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
            out.extend_from_slice(escape(&part.name).as_bytes());
            out.push(b'"');
            if let Some(filename) = &part.filename {
                out.extend_from_slice(b"; filename=\"");
                out.extend_from_slice(escape(filename).as_bytes());
                out.push(b'"');
            }
            out.extend_from_slice(b"\r\n");
            match part.content {
                Content::Text(value) => {
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(value.as_bytes());
                }
                Content::Bytes(data) => {
                    push_content_type(&mut out);
                    out.extend_from_slice(&data);
                }
                Content::File(path) => {
                    push_content_type(&mut out);
                    let data = fs::read(&path).map_err(|e| ArchiveError::io(&path, e))?;
                    out.extend_from_slice(&data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--");
        out.extend_from_slice(boundary.as_bytes());
        out.extend_from_slice(b"--\r\n");
        Ok(MultipartBody {
            body: out,
            boundary,
        })
    }
}

/// A framed body together with its boundary.
#[derive(Debug)]
pub struct MultipartBody {
    body: Vec<u8>,
    boundary: String,
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Consumes the body, returning `(content_type, bytes)`.
    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.content_type(), self.body)
    }
}

fn push_content_type(out: &mut Vec<u8>) {
    out.extend_from_slice(b"Content-Type: ");
    out.extend_from_slice(OCTET_STREAM.as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
}

// 128 random bits keep collisions with payload bytes negligible.
fn new_boundary() -> String {
    format!("----WebKitFormBoundary{:032x}", rand::random::<u128>())
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
