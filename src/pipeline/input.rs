//! Input resolution: turn a path, URL or uploaded bytes into a local file
//! plus the [`DocumentKind`] its extension implies.
//!
//! Downloaded and uploaded documents are written into temp storage owned by
//! the returned [`ResolvedInput`]; dropping it deletes the file. One
//! extraction, one temp file, no leaks across sessions.

use crate::error::DocQaError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

/// What the extractor should do with a file, decided by its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    /// Read as UTF-8, skip conversion and OCR.
    PlainText,
    /// Multi-page document: structured conversion, then per-page OCR.
    Pdf,
    /// Single raster image: structured conversion, then OCR directly.
    Image,
    /// Any other extension (lowercased, no dot). Only the structured
    /// converter can handle it; there is no OCR fallback.
    Other(String),
}

impl DocumentKind {
    /// Classify a lowercase or mixed-case extension, with or without the dot.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => DocumentKind::PlainText,
            "pdf" => DocumentKind::Pdf,
            "jpg" | "jpeg" | "png" | "bmp" | "tif" | "tiff" => DocumentKind::Image,
            other => DocumentKind::Other(other.to_string()),
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext)
    }
}

/// The resolved input: a local path, a downloaded temp file, or a staged upload.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the document was downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Input was an in-memory upload written to a named temp file.
    Staged { file: NamedTempFile },
}

impl ResolvedInput {
    /// Get the path to the document regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
            ResolvedInput::Staged { file } => file.path(),
        }
    }

    /// The document kind implied by the resolved path's extension.
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_path(self.path())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, DocQaError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Write uploaded bytes to a temp file that keeps the upload's extension.
///
/// Every extension is accepted here; the extractor decides whether the
/// document can be read.
pub fn stage_bytes(bytes: &[u8], filename: &str) -> Result<ResolvedInput, DocQaError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let suffix = if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    };

    let mut file = tempfile::Builder::new()
        .prefix("docqa-upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| DocQaError::Internal(format!("tempfile: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| DocQaError::Internal(format!("tempfile write: {e}")))?;

    debug!("Staged upload '{}' at {}", filename, file.path().display());
    Ok(ResolvedInput::Staged { file })
}

/// Resolve a local file path, validating existence and read permission.
fn resolve_local(path: &Path) -> Result<ResolvedInput, DocQaError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(DocQaError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocQaError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(DocQaError::FileNotFound { path });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, DocQaError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocQaError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DocQaError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocQaError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DocQaError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let filename = download_filename(url, content_type.as_deref());

    let temp_dir = TempDir::new().map_err(|e| DocQaError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocQaError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| DocQaError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Pick a file name for a download: the URL's last segment when it has an
/// extension, otherwise a name derived from the `Content-Type`.
fn download_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    let ext = match mime.as_deref() {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        Some("text/plain") => "txt",
        Some("text/markdown") => "md",
        _ => "pdf",
    };
    format!("downloaded.{ext}")
}
