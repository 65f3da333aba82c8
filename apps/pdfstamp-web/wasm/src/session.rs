//! Stateful signing session for the browser
//!
//! Wraps the core session. Pages are rendered by PDF.js in JavaScript, so
//! the session runs geometry-only: page sizes come from the document and
//! JavaScript must draw at [`SignerSession::render_scale`].

use pdfstamp_core::coords::ViewerRect;
use pdfstamp_core::{
    ClickOutcome, LoadReport, Rasterizer, SignerConfig, SigningSession, SIGNED_FILE_NAME,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Placement as seen by JavaScript
#[derive(Debug, Clone, PartialEq, Serialize)]
struct PlacementJs {
    id: f64,
    page: usize,
    x: f64,
    y: f64,
}

/// Stamp preview rectangle in canvas pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
struct OverlayJs {
    id: f64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl OverlayJs {
    fn new(id: u64, rect: ViewerRect) -> Self {
        Self {
            id: id as f64,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

#[wasm_bindgen]
pub struct SignerSession {
    inner: SigningSession,
}

impl Default for SignerSession {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl SignerSession {
    /// Create a session with the default configuration
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::from_config(SignerConfig::default())
    }

    /// Create a session from a JSON configuration
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(json: &str) -> Result<SignerSession, JsValue> {
        let config = SignerConfig::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: SignerConfig) -> Self {
        let rasterizer = Rasterizer::geometry_only(
            config.render_scale,
            "pages are rendered by the browser viewer",
        );
        Self {
            inner: SigningSession::with_rasterizer(config, rasterizer),
        }
    }

    /// Scale JavaScript must render pages at for clicks to map correctly
    #[wasm_bindgen(getter, js_name = renderScale)]
    pub fn render_scale(&self) -> f32 {
        self.inner.config().render_scale
    }

    #[wasm_bindgen(getter, js_name = fileName)]
    pub fn file_name(&self) -> String {
        SIGNED_FILE_NAME.to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        format!("{:?}", self.inner.state()).to_lowercase()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> usize {
        self.inner.page_count()
    }

    #[wasm_bindgen(getter, js_name = currentPage)]
    pub fn current_page(&self) -> usize {
        self.inner.current_page()
    }

    /// Internal load (testable without JsValue)
    fn load_internal(&mut self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<LoadReport, String> {
        self.inner
            .load(name, mime_type, bytes.to_vec())
            .map_err(|e| e.to_string())
    }

    /// Load an uploaded file. Returns the load report as a JS object.
    #[wasm_bindgen(js_name = loadDocument)]
    pub fn load_document(
        &mut self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<JsValue, JsValue> {
        let report = self
            .load_internal(name, mime_type, bytes)
            .map_err(|e| JsValue::from_str(&e))?;

        serde_wasm_bindgen::to_value(&report)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Page records (rendered and native sizes) as a JS array
    #[wasm_bindgen(js_name = getPages)]
    pub fn get_pages(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.pages())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Set the signature from the signature pad's PNG data URL
    #[wasm_bindgen(js_name = setSignature)]
    pub fn set_signature(&mut self, data_url: &str) -> Result<(), JsValue> {
        self.inner
            .set_signature_data_url(data_url)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = clearSignature)]
    pub fn clear_signature(&mut self) {
        self.inner.clear_signature();
    }

    #[wasm_bindgen(js_name = hasSignature)]
    pub fn has_signature(&self) -> bool {
        self.inner.has_signature()
    }

    #[wasm_bindgen(js_name = armPlacement)]
    pub fn arm_placement(&mut self) -> Result<(), JsValue> {
        self.inner
            .arm_placement()
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Leave placement mode (Escape)
    #[wasm_bindgen(js_name = cancelPlacement)]
    pub fn cancel_placement(&mut self) {
        self.inner.cancel_placement();
    }

    #[wasm_bindgen(getter, js_name = isArmed)]
    pub fn is_armed(&self) -> bool {
        self.inner.is_armed()
    }

    fn click_internal(&mut self, page: usize, x: f64, y: f64) -> Result<ClickOutcome, String> {
        self.inner.click(page, x, y).map_err(|e| e.to_string())
    }

    /// Handle a click on a page canvas. Returns `{ action, id? }`.
    pub fn click(&mut self, page: usize, x: f64, y: f64) -> Result<JsValue, JsValue> {
        let outcome = self
            .click_internal(page, x, y)
            .map_err(|e| JsValue::from_str(&e))?;

        serde_wasm_bindgen::to_value(&outcome)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(js_name = removePlacement)]
    pub fn remove_placement(&mut self, id: f64) -> bool {
        self.inner.remove_placement(id as u64)
    }

    fn placements_internal(&self) -> Vec<PlacementJs> {
        self.inner
            .placements()
            .iter()
            .map(|p| PlacementJs {
                id: p.id as f64,
                page: p.page,
                x: p.x,
                y: p.y,
            })
            .collect()
    }

    #[wasm_bindgen(js_name = getPlacements)]
    pub fn get_placements(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.placements_internal())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    fn overlays_internal(&self, page: usize) -> Result<Vec<OverlayJs>, String> {
        let rects = self.inner.overlay_rects(page).map_err(|e| e.to_string())?;
        Ok(rects
            .into_iter()
            .map(|(id, rect)| OverlayJs::new(id, rect))
            .collect())
    }

    /// Stamp previews for one page, in canvas pixels
    #[wasm_bindgen(js_name = getOverlays)]
    pub fn get_overlays(&self, page: usize) -> Result<JsValue, JsValue> {
        let overlays = self
            .overlays_internal(page)
            .map_err(|e| JsValue::from_str(&e))?;

        serde_wasm_bindgen::to_value(&overlays)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(js_name = nextPage)]
    pub fn next_page(&mut self) -> usize {
        self.inner.next_page()
    }

    #[wasm_bindgen(js_name = previousPage)]
    pub fn previous_page(&mut self) -> usize {
        self.inner.previous_page()
    }

    #[wasm_bindgen(js_name = goToPage)]
    pub fn go_to_page(&mut self, page: usize) -> Result<usize, JsValue> {
        self.inner
            .go_to_page(page)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    fn encode_internal(&mut self) -> Result<Vec<u8>, String> {
        self.inner
            .encode()
            .map(|signed| signed.bytes)
            .map_err(|e| e.to_string())
    }

    /// Produce the signed PDF as a Uint8Array
    pub fn encode(&mut self) -> Result<js_sys::Uint8Array, JsValue> {
        let bytes = self.encode_internal().map_err(|e| {
            web_sys::console::error_1(&JsValue::from_str(&e));
            JsValue::from_str(&e)
        })?;

        let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
        array.copy_from(&bytes);
        Ok(array)
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Shared by the crate's tests
#[cfg(test)]
pub(crate) fn create_test_pdf(num_pages: u32) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object};

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for _ in 0..num_pages {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => num_pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
