//! Rendering engine resolution
//!
//! Rendering needs a native library that may live in several places. The
//! configured sources are tried in order and the first one that binds wins;
//! every failure is recorded so an exhausted chain can be reported in full.

use crate::error::{Result, StampError};
use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// One candidate location of the rendering library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum EngineSource {
    /// Directory holding the platform library (e.g. `libpdfium.so`)
    LibraryDir(PathBuf),
    /// Exact path to the library file
    LibraryFile(PathBuf),
    /// Whatever the system loader resolves
    System,
}

impl EngineSource {
    /// Library next to the working directory first, then the system library
    pub fn default_chain() -> Vec<EngineSource> {
        vec![
            EngineSource::LibraryDir(PathBuf::from("./")),
            EngineSource::System,
        ]
    }
}

impl fmt::Display for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSource::LibraryDir(dir) => write!(f, "dir:{}", dir.display()),
            EngineSource::LibraryFile(path) => write!(f, "file:{}", path.display()),
            EngineSource::System => write!(f, "system"),
        }
    }
}

/// A page renderer backed by some decoding engine
pub trait RenderEngine: Send + Sync {
    /// Short name used in logs and load reports
    fn name(&self) -> &str;

    /// Render every page at `scale`, in native page order
    fn render_pages(&self, bytes: &[u8], scale: f32) -> Result<Vec<Raster>>;
}

/// Try each source in order and return the first success together with the
/// source that produced it.
pub fn resolve_first<T, F>(sources: &[EngineSource], mut attempt: F) -> Result<(T, EngineSource)>
where
    F: FnMut(&EngineSource) -> std::result::Result<T, String>,
{
    let mut attempts = Vec::with_capacity(sources.len());

    for source in sources {
        match attempt(source) {
            Ok(engine) => {
                tracing::debug!("Rendering engine bound from {}", source);
                return Ok((engine, source.clone()));
            }
            Err(reason) => {
                tracing::warn!("Rendering engine source {} failed: {}", source, reason);
                attempts.push(format!("{}: {}", source, reason));
            }
        }
    }

    if attempts.is_empty() {
        attempts.push("no engine sources configured".to_string());
    }
    Err(StampError::EngineInit { attempts })
}

/// Return the engine held in `slot`, binding it on first use. The slot keeps
/// the engine alive for the rest of the process; a failed bind leaves the
/// slot empty so a later call can try again.
pub fn bind_once<T, F>(slot: &Mutex<Option<Arc<T>>>, bind: F) -> Result<Arc<T>>
where
    F: FnOnce() -> Result<T>,
{
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(engine) = guard.as_ref() {
        return Ok(Arc::clone(engine));
    }
    let engine = Arc::new(bind()?);
    *guard = Some(Arc::clone(&engine));
    Ok(engine)
}

#[cfg(not(target_arch = "wasm32"))]
static PDFIUM: Mutex<Option<Arc<crate::pdfium::PdfiumEngine>>> = Mutex::new(None);

/// The process-wide native rendering engine, bound from the first working
/// source. Once bound, later calls share it and ignore `sources`.
#[cfg(not(target_arch = "wasm32"))]
pub fn resolve_engine(sources: &[EngineSource]) -> Result<Arc<dyn RenderEngine>> {
    let engine: Arc<dyn RenderEngine> =
        bind_once(&PDFIUM, || crate::pdfium::PdfiumEngine::bind(sources))?;
    Ok(engine)
}

/// The browser build has no native engine; pages are drawn by PDF.js
#[cfg(target_arch = "wasm32")]
pub fn resolve_engine(_sources: &[EngineSource]) -> Result<Arc<dyn RenderEngine>> {
    Err(StampError::EngineInit {
        attempts: vec!["no native rendering engine in the browser build".to_string()],
    })
}
