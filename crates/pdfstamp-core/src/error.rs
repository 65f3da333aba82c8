use thiserror::Error;

/// Errors surfaced by load, place and encode operations.
#[derive(Error, Debug)]
pub enum StampError {
    #[error("Failed to parse PDF: {0}")]
    DocumentParse(String),

    #[error("No rendering engine could be initialized (tried: {})", attempts.join("; "))]
    EngineInit { attempts: Vec<String> },

    #[error("Please create a signature first")]
    NoSignature,

    #[error("Page {page} has no rendered dimensions")]
    UnmappedPage { page: usize },

    #[error("Failed to create signed PDF: {0}")]
    Encode(#[from] EncodeError),

    #[error("Unsupported file type '{0}', please select a PDF file")]
    UnsupportedMimeType(String),

    #[error("Invalid signature image: {0}")]
    InvalidSignatureImage(String),

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    InvalidPage { page: usize, page_count: usize },

    #[error("Placement position ({x}, {y}) is not a finite point")]
    InvalidPosition { x: f64, y: f64 },

    #[error("Please add at least one signature before downloading")]
    NoPlacements,

    #[error("No document loaded")]
    NoDocument,

    #[error("Load result is stale (generation {got}, current {current})")]
    StaleLoad { got: u64, current: u64 },

    #[error("Failed to read document source: {0}")]
    Source(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Underlying cause of a failed re-encode.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Stream compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("{0}")]
    Structure(String),
}

pub type Result<T> = std::result::Result<T, StampError>;
