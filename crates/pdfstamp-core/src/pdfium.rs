//! Native page rendering via pdfium
//!
//! The pdfium bindings are process-global and dropping a `Pdfium` destroys
//! the library for every user. Sessions get the engine through
//! [`crate::engine::resolve_engine`], which binds it once and never drops it.

use crate::engine::{resolve_first, EngineSource, RenderEngine};
use crate::error::{Result, StampError};
use crate::raster::Raster;
use pdfium_render::prelude::*;

pub struct PdfiumEngine {
    pdfium: Pdfium,
    name: String,
}

impl PdfiumEngine {
    /// Bind pdfium from the first source that loads
    pub fn bind(sources: &[EngineSource]) -> Result<Self> {
        let (bindings, source) = resolve_first(sources, |source| {
            let bound = match source {
                EngineSource::LibraryDir(dir) => {
                    let dir = dir.to_string_lossy();
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&*dir))
                }
                EngineSource::LibraryFile(path) => Pdfium::bind_to_library(path),
                EngineSource::System => Pdfium::bind_to_system_library(),
            };
            bound.map_err(|e| e.to_string())
        })?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            name: format!("pdfium ({})", source),
        })
    }
}

impl RenderEngine for PdfiumEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_pages(&self, bytes: &[u8], scale: f32) -> Result<Vec<Raster>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| StampError::DocumentParse(e.to_string()))?;

        let page_count = document.pages().len();
        let mut rasters = Vec::with_capacity(page_count as usize);

        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(
                    &PdfRenderConfig::new()
                        .scale_page_by_factor(scale)
                        .render_form_data(true)
                        .render_annotations(true),
                )
                .map_err(|e| {
                    StampError::DocumentParse(format!("Failed to render page {}: {}", index + 1, e))
                })?;

            let image = bitmap.as_image().to_rgba8();
            let (width, height) = image.dimensions();
            tracing::trace!(
                "Rendered page {}/{} at {}x{}",
                index + 1,
                page_count,
                width,
                height
            );
            rasters.push(Raster::new(width, height, image.into_raw()));
        }

        Ok(rasters)
    }
}
