//! Signing session
//!
//! One session owns one loaded document, its page records and the
//! placements made against them. A failed operation never touches the
//! loaded document or its placements.
//!
//! ```text
//! Empty -> Loaded -> Placing -> Encoding -> Done
//!                       ^                 \-> Failed
//!                       `---- edits / retry ---'
//! ```

use crate::config::{PlacementMode, SignerConfig};
use crate::coords::{overlay_rect, ViewerRect};
use crate::document::{
    check_mime, validate_pdf, DocumentInfo, DocumentSource, InMemorySource, SignedDocument,
};
use crate::error::{Result, StampError};
use crate::placement::{Placement, PlacementId, PlacementTracker};
use crate::raster::{Page, RasterizedDocument, Rasterizer, RenderSupport};
use crate::reencode::Reencoder;
use crate::signature::SignatureImage;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    Loaded,
    Placing,
    Encoding,
    Done,
    Failed,
}

/// Identifies one load attempt. Only the ticket from the most recent
/// [`SigningSession::begin_load`] can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A document that has been validated and rasterized but not yet installed
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub info: DocumentInfo,
    pub rasterized: RasterizedDocument,
}

/// What the caller should show after a load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub name: String,
    pub info: DocumentInfo,
    pub support: RenderSupport,
    /// Set when pages could not be rendered and the user should be told
    pub warning: Option<String>,
}

/// Result of a click on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClickOutcome {
    Added { id: PlacementId },
    Removed { id: PlacementId },
    Ignored,
}

struct LoadedDocument {
    source: Box<dyn DocumentSource>,
    info: DocumentInfo,
    pages: Vec<Page>,
    support: RenderSupport,
}

pub struct SigningSession {
    config: SignerConfig,
    rasterizer: Rasterizer,
    reencoder: Reencoder,
    document: Option<LoadedDocument>,
    tracker: PlacementTracker,
    signature: Option<Arc<SignatureImage>>,
    current_page: usize,
    armed: bool,
    generation: u64,
    state: SessionState,
}

impl SigningSession {
    /// Create a session on the process-wide rendering engine, binding it
    /// from the config's sources if no session has yet
    pub fn new(config: SignerConfig) -> Self {
        let rasterizer = Rasterizer::new(&config);
        Self::with_rasterizer(config, rasterizer)
    }

    pub fn with_rasterizer(config: SignerConfig, rasterizer: Rasterizer) -> Self {
        Self {
            reencoder: Reencoder::new(&config),
            config,
            rasterizer,
            document: None,
            tracker: PlacementTracker::new(),
            signature: None,
            current_page: 0,
            armed: false,
            generation: 0,
            state: SessionState::Empty,
        }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    // ---- Loading ----

    /// Start a load. Any load begun earlier becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Validate and rasterize a source without touching the session
    pub fn prepare(&self, source: &dyn DocumentSource) -> Result<PreparedDocument> {
        let bytes = source.read_bytes()?;
        let info = validate_pdf(&bytes)?;
        let rasterized = self.rasterizer.rasterize(&bytes)?;
        Ok(PreparedDocument { info, rasterized })
    }

    /// Install a prepared document. Fails with `StaleLoad` if another load
    /// began after `ticket` was issued.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        source: Box<dyn DocumentSource>,
        prepared: PreparedDocument,
    ) -> Result<LoadReport> {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Discarding stale load of {} (generation {}, current {})",
                source.name(),
                ticket.generation,
                self.generation
            );
            return Err(StampError::StaleLoad {
                got: ticket.generation,
                current: self.generation,
            });
        }

        let PreparedDocument { info, rasterized } = prepared;
        let warning = match &rasterized.support {
            RenderSupport::Rendered(_) => None,
            RenderSupport::Unavailable(reason) => {
                Some(format!("Page previews are unavailable: {}", reason))
            }
        };
        let report = LoadReport {
            name: source.name().to_string(),
            info: info.clone(),
            support: rasterized.support.clone(),
            warning,
        };

        tracing::info!(
            "Loaded {} ({} pages, {} bytes)",
            report.name,
            info.page_count,
            info.size_bytes
        );

        self.document = Some(LoadedDocument {
            source,
            info,
            pages: rasterized.pages,
            support: rasterized.support,
        });
        self.tracker.clear();
        self.current_page = 0;
        self.armed = false;
        self.state = SessionState::Loaded;
        Ok(report)
    }

    /// Load from a source in one step
    pub fn load_source(&mut self, source: Box<dyn DocumentSource>) -> Result<LoadReport> {
        let ticket = self.begin_load();
        let prepared = self.prepare(&*source)?;
        self.complete_load(ticket, source, prepared)
    }

    /// Load an uploaded file, checking its declared type first
    pub fn load(&mut self, name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<LoadReport> {
        check_mime(mime_type)?;
        self.load_source(Box::new(InMemorySource::new(name, bytes)))
    }

    /// Drop the document and all placements
    pub fn reset(&mut self) {
        self.generation += 1;
        self.document = None;
        self.tracker.clear();
        self.current_page = 0;
        self.armed = false;
        self.state = SessionState::Empty;
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(|d| &d.info)
    }

    pub fn render_support(&self) -> Option<&RenderSupport> {
        self.document.as_ref().map(|d| &d.support)
    }

    pub fn page_count(&self) -> usize {
        self.document.as_ref().map_or(0, |d| d.pages.len())
    }

    pub fn pages(&self) -> &[Page] {
        self.document
            .as_ref()
            .map(|d| d.pages.as_slice())
            .unwrap_or(&[])
    }

    pub fn page(&self, index: usize) -> Result<&Page> {
        let document = self.document.as_ref().ok_or(StampError::NoDocument)?;
        document.pages.get(index).ok_or(StampError::InvalidPage {
            page: index,
            page_count: document.pages.len(),
        })
    }

    // ---- Signature ----

    pub fn set_signature(&mut self, image: SignatureImage) {
        self.signature = Some(Arc::new(image));
    }

    /// Accept the signature pad's PNG data URL
    pub fn set_signature_data_url(&mut self, url: &str) -> Result<()> {
        let image = SignatureImage::from_data_url(url)?;
        self.set_signature(image);
        Ok(())
    }

    pub fn clear_signature(&mut self) {
        self.signature = None;
    }

    pub fn has_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| !s.is_blank())
    }

    // ---- Placement ----

    pub fn placement_mode(&self) -> PlacementMode {
        self.config.placement_mode
    }

    pub fn is_armed(&self) -> bool {
        self.config.placement_mode == PlacementMode::Sticky || self.armed
    }

    /// Arm the next click to place a signature
    pub fn arm_placement(&mut self) -> Result<()> {
        if !self.has_signature() {
            return Err(StampError::NoSignature);
        }
        self.armed = true;
        Ok(())
    }

    pub fn cancel_placement(&mut self) {
        self.armed = false;
    }

    pub fn add_placement(&mut self, page: usize, x: f64, y: f64) -> Result<PlacementId> {
        self.page(page)?;
        let id = self.tracker.add(page, x, y, self.signature.as_ref())?;
        if self.config.placement_mode == PlacementMode::OneShot {
            self.armed = false;
        }
        tracing::debug!("Placed signature {} on page {} at ({}, {})", id, page, x, y);
        self.after_edit();
        Ok(id)
    }

    pub fn remove_placement(&mut self, id: PlacementId) -> bool {
        let removed = self.tracker.remove(id);
        if removed {
            self.after_edit();
        }
        removed
    }

    /// A click on an existing stamp removes it; otherwise an armed session
    /// places a new one there.
    pub fn click(&mut self, page: usize, x: f64, y: f64) -> Result<ClickOutcome> {
        let record = self.page(page)?;

        // Most recently placed stamp wins when stamps overlap
        let mut hit = None;
        for placement in self.tracker.for_page(page).into_iter().rev() {
            if overlay_rect(placement, record, &self.config.stamp)?.contains(x, y) {
                hit = Some(placement.id);
                break;
            }
        }

        if let Some(id) = hit {
            self.remove_placement(id);
            return Ok(ClickOutcome::Removed { id });
        }
        if self.is_armed() {
            let id = self.add_placement(page, x, y)?;
            return Ok(ClickOutcome::Added { id });
        }
        Ok(ClickOutcome::Ignored)
    }

    pub fn placements(&self) -> &[Placement] {
        self.tracker.placements()
    }

    pub fn placements_on(&self, page: usize) -> Vec<&Placement> {
        self.tracker.for_page(page)
    }

    /// Stamp previews for a page, in viewer pixels
    pub fn overlay_rects(&self, page: usize) -> Result<Vec<(PlacementId, ViewerRect)>> {
        let record = self.page(page)?;
        self.tracker
            .for_page(page)
            .into_iter()
            .map(|p| Ok((p.id, overlay_rect(p, record, &self.config.stamp)?)))
            .collect()
    }

    fn after_edit(&mut self) {
        self.state = if self.tracker.is_empty() {
            SessionState::Loaded
        } else {
            SessionState::Placing
        };
    }

    // ---- Navigation ----

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn go_to_page(&mut self, page: usize) -> Result<usize> {
        self.page(page)?;
        self.current_page = page;
        Ok(page)
    }

    pub fn next_page(&mut self) -> usize {
        if self.current_page + 1 < self.page_count() {
            self.current_page += 1;
        }
        self.current_page
    }

    pub fn previous_page(&mut self) -> usize {
        self.current_page = self.current_page.saturating_sub(1);
        self.current_page
    }

    // ---- Output ----

    /// Re-encode the original with every placement stamped on it
    pub fn encode(&mut self) -> Result<SignedDocument> {
        let document = self.document.as_ref().ok_or(StampError::NoDocument)?;
        if self.tracker.is_empty() {
            return Err(StampError::NoPlacements);
        }

        self.state = SessionState::Encoding;
        let result = self.reencoder.reencode(
            &*document.source,
            self.tracker.placements(),
            &document.pages,
        );

        match result {
            Ok(bytes) => {
                self.state = SessionState::Done;
                Ok(SignedDocument::new(bytes))
            }
            Err(e) => {
                tracing::warn!("Encoding failed: {}", e);
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}
