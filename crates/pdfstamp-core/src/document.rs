//! Document intake: MIME checks, validation and byte sources

use crate::error::{Result, StampError};
use lopdf::Document;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const SIGNED_FILE_NAME: &str = "signed-document.pdf";

/// Reject anything that is not declared as a PDF
pub fn check_mime(mime_type: &str) -> Result<()> {
    // Browsers may append parameters ("application/pdf; charset=binary")
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case(PDF_MIME_TYPE) {
        Ok(())
    } else {
        Err(StampError::UnsupportedMimeType(mime_type.to_string()))
    }
}

/// Basic facts about a loaded PDF
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
}

/// Validate a PDF and extract basic info
pub fn validate_pdf(bytes: &[u8]) -> Result<DocumentInfo> {
    if bytes.len() < 8 {
        return Err(StampError::DocumentParse(
            "File too small to be a valid PDF".to_string(),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(StampError::DocumentParse(
            "Not a valid PDF file (missing %PDF- header)".to_string(),
        ));
    }

    let document =
        Document::load_mem(bytes).map_err(|e| StampError::DocumentParse(e.to_string()))?;

    let page_count = document.get_pages().len();
    if page_count == 0 {
        return Err(StampError::DocumentParse("PDF has no pages".to_string()));
    }

    Ok(DocumentInfo {
        page_count,
        version: extract_version(bytes),
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
    })
}

fn extract_version(bytes: &[u8]) -> String {
    // Header format: %PDF-1.7
    bytes
        .get(5..8)
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "1.4".to_string())
}

/// Where the original document bytes come from.
///
/// Every call to [`DocumentSource::read_bytes`] returns a buffer the caller
/// owns outright, so a consumer (the re-encoder, a renderer) can never leave
/// the source unreadable for the next step.
pub trait DocumentSource: Send + Sync {
    /// Display name, usually the uploaded file name
    fn name(&self) -> &str;

    fn read_bytes(&self) -> Result<Vec<u8>>;
}

/// Document held in memory, copied out on every read
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    bytes: Arc<[u8]>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl DocumentSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

/// Document on disk, re-read on every access
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(StampError::Source)
    }
}

/// The re-encoded document, ready to hand to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedDocument {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

impl SignedDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: SIGNED_FILE_NAME.to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
