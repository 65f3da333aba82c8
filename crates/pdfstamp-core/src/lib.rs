//! Signature placement and PDF re-encoding
//!
//! Renders PDF pages for display, records where the user drops a signature
//! (in viewer pixels), maps those anchors into PDF page space and stamps
//! the signature image onto a fresh copy of the original document.
//!
//! - [`SigningSession`]: the stateful entry point (load, place, encode)
//! - [`Rasterizer`] / [`RenderEngine`]: page rendering with engine fallback
//! - [`coords`]: viewer <-> PDF coordinate mapping
//! - [`Reencoder`]: embeds signature images and serializes the output

pub mod config;
pub mod coords;
pub mod document;
pub mod engine;
pub mod error;
#[cfg(not(target_arch = "wasm32"))]
pub mod pdfium;
pub mod placement;
pub mod raster;
pub mod reencode;
pub mod session;
pub mod signature;

pub use config::{PlacementMode, SignerConfig, StampSize};
pub use coords::{
    document_to_viewer, map_to_document_space, stamp_rect, viewer_to_document, DocPoint, PdfRect,
    ViewerRect,
};
pub use document::{
    check_mime, validate_pdf, DocumentInfo, DocumentSource, FileSource, InMemorySource,
    SignedDocument, PDF_MIME_TYPE, SIGNED_FILE_NAME,
};
pub use engine::{EngineSource, RenderEngine};
pub use error::{EncodeError, Result, StampError};
pub use placement::{Placement, PlacementId, PlacementTracker};
pub use raster::{Page, Raster, RasterizedDocument, Rasterizer, RenderSupport};
pub use reencode::Reencoder;
pub use session::{
    ClickOutcome, LoadReport, LoadTicket, PreparedDocument, SessionState, SigningSession,
};
pub use signature::SignatureImage;
