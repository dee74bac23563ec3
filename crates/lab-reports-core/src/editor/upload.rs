//! Source document upload validation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Upload errors. The editor stays in the uploading state on any of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Unsupported file type '{content_type}' for {file_name}; upload an image or PDF")]
    InvalidFileType {
        file_name: String,
        content_type: String,
    },

    #[error("File is too large ({size} bytes); the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("File {0} is empty")]
    EmptyDocument(String),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Accepted document families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "heic", "tif", "tiff"];

/// A document attached by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub file_name: String,
    /// MIME type as reported by the browser/shell (may be empty)
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Hex SHA-256 of the document contents.
    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Metadata for an accepted upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub file_name: String,
    pub content_type: String,
    pub kind: DocumentKind,
    pub size_bytes: u64,
    pub sha256: String,
}

impl UploadedDocument {
    /// Content-addressed reference used when no storage URL was supplied.
    pub fn reference(&self) -> String {
        format!("sha256:{}", self.sha256)
    }
}

/// Classify a document by MIME type, falling back to the file extension when
/// the type is missing or generic.
pub fn classify(file_name: &str, content_type: &str) -> Option<DocumentKind> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if mime.starts_with("image/") {
        return Some(DocumentKind::Image);
    }
    match mime.as_str() {
        "application/pdf" | "application/x-pdf" => return Some(DocumentKind::Pdf),
        "" | "application/octet-stream" => {}
        _ => return None,
    }

    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    if extension == "pdf" {
        Some(DocumentKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(DocumentKind::Image)
    } else {
        None
    }
}

/// Validate upload metadata before any bytes are read.
pub fn validate_metadata(
    file_name: &str,
    content_type: &str,
    size: u64,
    limit: u64,
) -> UploadResult<DocumentKind> {
    let kind = classify(file_name, content_type).ok_or_else(|| UploadError::InvalidFileType {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
    })?;

    if size == 0 {
        return Err(UploadError::EmptyDocument(file_name.to_string()));
    }
    if size > limit {
        return Err(UploadError::FileTooLarge { size, limit });
    }
    Ok(kind)
}

/// Validate a document and compute its digest.
pub fn validate_upload(document: &SourceDocument, limit: u64) -> UploadResult<UploadedDocument> {
    let kind = validate_metadata(
        &document.file_name,
        &document.content_type,
        document.size(),
        limit,
    )?;

    Ok(UploadedDocument {
        file_name: document.file_name.clone(),
        content_type: document.content_type.clone(),
        kind,
        size_bytes: document.size(),
        sha256: document.sha256(),
    })
}
