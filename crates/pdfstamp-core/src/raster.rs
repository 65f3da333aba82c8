//! Page rasterization
//!
//! Produces one [`Page`] per document page with both the rendered (viewer
//! pixel) size and the native (MediaBox) size. Page geometry always comes
//! from the document structure; rasters come from the resolved engine when
//! one is available. Without an engine the pages are still produced at the
//! configured scale, but the result says rendering is unavailable so the
//! caller can tell the user instead of showing blank pages.

use crate::config::SignerConfig;
use crate::engine::{resolve_engine, RenderEngine};
use crate::error::{Result, StampError};
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::{Dictionary, Document, Object};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// US Letter, used when neither the page nor its ancestors carry a MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// An RGBA8 bitmap of a rendered page
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl Raster {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Encode as PNG for display
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(self.width, self.height, &self.rgba)
            .map_err(|e| StampError::DocumentParse(format!("Failed to encode page image: {}", e)))
    }

    /// PNG data URL, the form an `<img>` element takes directly
    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }
}

/// Encode RGBA8 pixels as a PNG
pub fn encode_png(
    width: u32,
    height: u32,
    rgba: &[u8],
) -> std::result::Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
        writer.finish()?;
    }
    Ok(out)
}

/// A document page as shown in the viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 0-based page index
    pub index: usize,
    /// Size on screen in viewer pixels, with rotation applied
    pub rendered_width: f64,
    pub rendered_height: f64,
    /// MediaBox size in points
    pub native_width: f64,
    pub native_height: f64,
    /// MediaBox lower-left corner
    pub origin_x: f64,
    pub origin_y: f64,
    /// Clockwise display rotation in degrees (0, 90, 180, 270), applied
    /// when mapping viewer points onto the page
    pub rotation: i32,
    #[serde(skip)]
    pub raster: Option<Raster>,
}

impl Page {
    /// MediaBox as [x, y, width, height]
    pub fn media_box(&self) -> [f64; 4] {
        [
            self.origin_x,
            self.origin_y,
            self.native_width,
            self.native_height,
        ]
    }

    pub fn is_mapped(&self) -> bool {
        self.rendered_width > 0.0 && self.rendered_height > 0.0
    }
}

/// Whether pages came with rasters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RenderSupport {
    /// Rasters produced by the named engine
    Rendered(String),
    /// No engine; pages carry geometry only and the reason must be shown
    Unavailable(String),
}

impl RenderSupport {
    pub fn is_available(&self) -> bool {
        matches!(self, RenderSupport::Rendered(_))
    }
}

#[derive(Debug, Clone)]
pub struct RasterizedDocument {
    pub pages: Vec<Page>,
    pub support: RenderSupport,
}

impl RasterizedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Native page geometry read from the document structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub media_box: [f64; 4],
    pub rotation: i32,
}

impl PageGeometry {
    /// Width and height of the page as displayed, in points
    pub fn display_size(&self) -> (f64, f64) {
        let [_, _, width, height] = self.media_box;
        if self.rotation % 180 == 0 {
            (width, height)
        } else {
            (height, width)
        }
    }
}

#[derive(Clone)]
pub struct Rasterizer {
    scale: f32,
    engine: std::result::Result<Arc<dyn RenderEngine>, String>,
}

impl Rasterizer {
    /// Resolve the rendering engine from the configured sources. An exhausted
    /// chain is not an error here: the rasterizer degrades to geometry-only.
    pub fn new(config: &SignerConfig) -> Self {
        let engine = resolve_engine(&config.engine_sources).map_err(|e| {
            tracing::warn!("Page rendering disabled: {}", e);
            e.to_string()
        });
        Self {
            scale: config.render_scale,
            engine,
        }
    }

    pub fn with_engine(scale: f32, engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            scale,
            engine: Ok(engine),
        }
    }

    pub fn geometry_only(scale: f32, reason: impl Into<String>) -> Self {
        Self {
            scale,
            engine: Err(reason.into()),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn support(&self) -> RenderSupport {
        match &self.engine {
            Ok(engine) => RenderSupport::Rendered(engine.name().to_string()),
            Err(reason) => RenderSupport::Unavailable(reason.clone()),
        }
    }

    /// Produce one page record per document page, in page order
    pub fn rasterize(&self, bytes: &[u8]) -> Result<RasterizedDocument> {
        let geometry = read_page_geometry(bytes)?;
        let scale = self.scale as f64;

        let pages = match &self.engine {
            Ok(engine) => {
                let rasters = engine.render_pages(bytes, self.scale)?;
                if rasters.len() != geometry.len() {
                    return Err(StampError::DocumentParse(format!(
                        "Renderer produced {} pages, document has {}",
                        rasters.len(),
                        geometry.len()
                    )));
                }
                geometry
                    .iter()
                    .zip(rasters)
                    .enumerate()
                    .map(|(index, (geom, raster))| Page {
                        index,
                        rendered_width: raster.width as f64,
                        rendered_height: raster.height as f64,
                        native_width: geom.media_box[2],
                        native_height: geom.media_box[3],
                        origin_x: geom.media_box[0],
                        origin_y: geom.media_box[1],
                        rotation: geom.rotation,
                        raster: Some(raster),
                    })
                    .collect()
            }
            Err(_) => geometry
                .iter()
                .enumerate()
                .map(|(index, geom)| {
                    let (width, height) = geom.display_size();
                    Page {
                        index,
                        rendered_width: width * scale,
                        rendered_height: height * scale,
                        native_width: geom.media_box[2],
                        native_height: geom.media_box[3],
                        origin_x: geom.media_box[0],
                        origin_y: geom.media_box[1],
                        rotation: geom.rotation,
                        raster: None,
                    }
                })
                .collect(),
        };

        tracing::debug!("Rasterized {} pages at {}x", geometry.len(), self.scale);
        Ok(RasterizedDocument {
            pages,
            support: self.support(),
        })
    }
}

/// Read every page's MediaBox and rotation, in page order
pub fn read_page_geometry(bytes: &[u8]) -> Result<Vec<PageGeometry>> {
    let doc = Document::load_mem(bytes).map_err(|e| StampError::DocumentParse(e.to_string()))?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(StampError::DocumentParse("PDF has no pages".to_string()));
    }

    let mut geometry = Vec::with_capacity(pages.len());
    for (page_num, page_id) in pages {
        let page_dict = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|_| {
                StampError::DocumentParse(format!("Page {} is not a dictionary", page_num))
            })?;

        let media_box = inherited(&doc, page_dict, b"MediaBox")
            .map(|obj| parse_box(&doc, obj))
            .transpose()
            .map_err(|e| StampError::DocumentParse(format!("Page {}: {}", page_num, e)))?
            .unwrap_or(DEFAULT_MEDIA_BOX);

        if media_box[2] <= 0.0 || media_box[3] <= 0.0 {
            return Err(StampError::DocumentParse(format!(
                "Page {} has an empty MediaBox",
                page_num
            )));
        }

        let rotation = inherited(&doc, page_dict, b"Rotate")
            .and_then(|obj| resolve(&doc, obj).as_i64().ok())
            .map(|angle| normalize_rotation(angle as i32))
            .unwrap_or(0);

        geometry.push(PageGeometry {
            media_box,
            rotation,
        });
    }

    Ok(geometry)
}

/// Look up an inheritable page attribute, walking the Parent chain
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    // Bounded walk: malformed trees can contain Parent cycles
    for _ in 0..32 {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent_id = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Parse a PDF rectangle into [x, y, width, height]
fn parse_box(doc: &Document, obj: &Object) -> std::result::Result<[f64; 4], String> {
    let arr = resolve(doc, obj)
        .as_array()
        .map_err(|_| "MediaBox is not an array".to_string())?;
    if arr.len() != 4 {
        return Err(format!("MediaBox has {} elements, expected 4", arr.len()));
    }

    let mut values = [0.0f64; 4];
    for (i, item) in arr.iter().enumerate() {
        values[i] = match resolve(doc, item) {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("MediaBox element {} is not a number", i)),
        };
    }

    let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
    Ok([x1, y1, x2 - x1, y2 - y1])
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360) / 90 * 90
}
