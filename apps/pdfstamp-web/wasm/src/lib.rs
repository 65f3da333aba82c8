//! WASM bindings for signature placement
//!
//! All signing state lives in Rust; JavaScript renders pages with PDF.js at
//! the session's render scale, forwards clicks, and downloads the result.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { SignerSession } from './pkg/pdfstamp_wasm.js';
//!
//! await init();
//!
//! const session = new SignerSession();
//! const report = session.loadDocument(file.name, file.type, bytes);
//! session.setSignature(signaturePad.toDataURL('image/png'));
//! canvas.onclick = (e) => session.click(pageIndex, e.offsetX, e.offsetY);
//! const signed = session.encode();
//! downloadBlob(signed, session.fileName);
//! ```

pub mod session;

use pdfstamp_core::coords::viewer_to_document;
use pdfstamp_core::{Page, StampSize};
use wasm_bindgen::prelude::*;

pub use session::SignerSession;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get PDF info without creating a session
#[wasm_bindgen]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = pdfstamp_core::validate_pdf(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Map a viewer click to PDF coordinates for display (e.g. a coordinate readout)
#[wasm_bindgen]
pub fn viewer_to_pdf(
    viewer_x: f64,
    viewer_y: f64,
    rendered_width: f64,
    rendered_height: f64,
    page_width: f64,
    page_height: f64,
) -> Result<Vec<f64>, JsValue> {
    let point = map_point(
        viewer_x,
        viewer_y,
        [rendered_width, rendered_height],
        [page_width, page_height],
    )
    .map_err(|e| JsValue::from_str(&e))?;
    Ok(vec![point.0, point.1])
}

fn map_point(
    x: f64,
    y: f64,
    rendered: [f64; 2],
    native: [f64; 2],
) -> Result<(f64, f64), String> {
    let page = Page {
        index: 0,
        rendered_width: rendered[0],
        rendered_height: rendered[1],
        native_width: native[0],
        native_height: native[1],
        origin_x: 0.0,
        origin_y: 0.0,
        rotation: 0,
        raster: None,
    };
    let point = viewer_to_document(x, y, &page).map_err(|e| e.to_string())?;
    Ok((point.x, point.y))
}

/// Default stamp size in points, so the page overlay can match the output
#[wasm_bindgen]
pub fn default_stamp_size() -> Vec<f64> {
    let stamp = StampSize::default();
    vec![stamp.width, stamp.height]
}
