//! Coordinate transformation between viewer and PDF coordinate systems

use crate::config::StampSize;
use crate::error::{Result, StampError};
use crate::placement::Placement;
use crate::raster::Page;
use serde::Serialize;

/// A point in native page space (points, origin bottom-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DocPoint {
    pub x: f64,
    pub y: f64,
}

/// Rectangle in native page space; (x, y) is the lower-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in viewer pixels; (x, y) is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewerRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewerRect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Fractions (0..1, from the top-left) on the unrotated page for a point at
/// fractions `(u, v)` of the page as displayed with `/Rotate` applied
fn unrotate(u: f64, v: f64, rotation: i32) -> (f64, f64) {
    match rotation {
        90 => (v, 1.0 - u),
        180 => (1.0 - u, 1.0 - v),
        270 => (1.0 - v, u),
        _ => (u, v),
    }
}

fn rotate(a: f64, b: f64, rotation: i32) -> (f64, f64) {
    match rotation {
        90 => (1.0 - b, a),
        180 => (1.0 - a, 1.0 - b),
        270 => (b, 1.0 - a),
        _ => (a, b),
    }
}

/// Map a viewer point (pixels, origin top-left) onto `page` in native space
/// (points, origin bottom-left).
///
/// For an unrotated page this is `ox + (vx / rw) * nw` and
/// `oy + nh - (vy / rh) * nh`.
pub fn viewer_to_document(x: f64, y: f64, page: &Page) -> Result<DocPoint> {
    if !page.is_mapped() {
        return Err(StampError::UnmappedPage { page: page.index });
    }
    let (a, b) = unrotate(
        x / page.rendered_width,
        y / page.rendered_height,
        page.rotation,
    );
    Ok(DocPoint {
        x: page.origin_x + a * page.native_width,
        y: page.origin_y + page.native_height - b * page.native_height,
    })
}

/// Inverse of [`viewer_to_document`]
pub fn document_to_viewer(point: DocPoint, page: &Page) -> Result<(f64, f64)> {
    if !page.is_mapped() {
        return Err(StampError::UnmappedPage { page: page.index });
    }
    let a = (point.x - page.origin_x) / page.native_width;
    let b = 1.0 - (point.y - page.origin_y) / page.native_height;
    let (u, v) = rotate(a, b, page.rotation);
    Ok((u * page.rendered_width, v * page.rendered_height))
}

/// Map a placement's anchor onto its page in native space
pub fn map_to_document_space(placement: &Placement, page: &Page) -> Result<DocPoint> {
    viewer_to_document(placement.x, placement.y, page)
}

/// Stamp rectangle centered on the anchor
pub fn stamp_rect(anchor: DocPoint, stamp: &StampSize) -> PdfRect {
    PdfRect {
        x: anchor.x - stamp.half_width(),
        y: anchor.y - stamp.half_height(),
        width: stamp.width,
        height: stamp.height,
    }
}

/// The stamp as it appears on screen, for drawing previews and hit-testing
pub fn overlay_rect(placement: &Placement, page: &Page, stamp: &StampSize) -> Result<ViewerRect> {
    let rect = stamp_rect(map_to_document_space(placement, page)?, stamp);
    let (x1, y1) = document_to_viewer(DocPoint { x: rect.x, y: rect.y }, page)?;
    let (x2, y2) = document_to_viewer(
        DocPoint {
            x: rect.x + rect.width,
            y: rect.y + rect.height,
        },
        page,
    )?;
    Ok(ViewerRect {
        x: x1.min(x2),
        y: y1.min(y2),
        width: (x2 - x1).abs(),
        height: (y2 - y1).abs(),
    })
}
