//! Placement tracking
//!
//! Records where the user dropped signatures, in viewer pixels, in the
//! order they were placed.

use crate::error::{Result, StampError};
use crate::signature::SignatureImage;
use serde::Serialize;
use std::sync::Arc;

pub type PlacementId = u64;

/// A signature anchor on a rendered page
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub id: PlacementId,
    /// 0-based page index
    pub page: usize,
    /// Anchor (stamp center) in viewer pixels, origin top-left
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    pub signature: Arc<SignatureImage>,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementTracker {
    next_id: PlacementId,
    placements: Vec<Placement>,
}

impl PlacementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placement. Fails without touching the list when there is no
    /// signature, the signature has nothing drawn or the anchor is not a
    /// finite point.
    pub fn add(
        &mut self,
        page: usize,
        x: f64,
        y: f64,
        signature: Option<&Arc<SignatureImage>>,
    ) -> Result<PlacementId> {
        let signature = match signature {
            Some(sig) if !sig.is_blank() => Arc::clone(sig),
            _ => return Err(StampError::NoSignature),
        };
        if !(x.is_finite() && y.is_finite()) {
            return Err(StampError::InvalidPosition { x, y });
        }

        let id = self.next_id;
        self.next_id += 1;

        self.placements.push(Placement {
            id,
            page,
            x,
            y,
            signature,
        });
        Ok(id)
    }

    /// Remove a placement; unknown ids are a no-op
    pub fn remove(&mut self, id: PlacementId) -> bool {
        if let Some(pos) = self.placements.iter().position(|p| p.id == id) {
            self.placements.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: PlacementId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.id == id)
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn for_page(&self, page: usize) -> Vec<&Placement> {
        self.placements.iter().filter(|p| p.page == page).collect()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Drop every placement. Ids keep counting so old ids never come back.
    pub fn clear(&mut self) {
        self.placements.clear();
    }
}
