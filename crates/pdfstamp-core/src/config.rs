//! Signer configuration
//!
//! Defaults match the on-screen signer: pages rendered at 1.5x and a
//! 100x50 point stamp centered on the click.

use crate::engine::EngineSource;
use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_RENDER_SCALE: f32 = 1.5;

/// Size of the signature stamp in document units (points)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampSize {
    pub width: f64,
    pub height: f64,
}

impl Default for StampSize {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 50.0,
        }
    }
}

impl StampSize {
    pub fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    pub fn half_height(&self) -> f64 {
        self.height / 2.0
    }
}

/// How the session behaves after a placement is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// Every click on a page places a signature
    #[default]
    Sticky,
    /// Placement must be armed before each click and disarms afterwards
    OneShot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Magnification used when rendering pages for display
    pub render_scale: f32,
    pub stamp: StampSize,
    /// Rendering engine locations, tried in order
    pub engine_sources: Vec<EngineSource>,
    pub placement_mode: PlacementMode,
    /// FlateDecode embedded signature images
    pub compress_images: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            render_scale: DEFAULT_RENDER_SCALE,
            stamp: StampSize::default(),
            engine_sources: EngineSource::default_chain(),
            placement_mode: PlacementMode::default(),
            compress_images: true,
        }
    }
}

impl SignerConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables (all optional):
    /// - PDFSTAMP_RENDER_SCALE: page magnification (default: 1.5)
    /// - PDFSTAMP_STAMP_WIDTH / PDFSTAMP_STAMP_HEIGHT: stamp size in points
    /// - PDFSTAMP_PDFIUM_DIR: directory holding the pdfium library, tried first
    /// - PDFSTAMP_PLACEMENT_MODE: "sticky" or "one_shot"
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(scale) = env_number("PDFSTAMP_RENDER_SCALE")? {
            config.render_scale = scale as f32;
        }
        if let Some(width) = env_number("PDFSTAMP_STAMP_WIDTH")? {
            config.stamp.width = width;
        }
        if let Some(height) = env_number("PDFSTAMP_STAMP_HEIGHT")? {
            config.stamp.height = height;
        }

        if let Ok(dir) = std::env::var("PDFSTAMP_PDFIUM_DIR") {
            if !dir.trim().is_empty() {
                config
                    .engine_sources
                    .insert(0, EngineSource::LibraryDir(PathBuf::from(dir.trim())));
            }
        }

        if let Ok(mode) = std::env::var("PDFSTAMP_PLACEMENT_MODE") {
            config.placement_mode = match mode.to_lowercase().as_str() {
                "sticky" => PlacementMode::Sticky,
                "one_shot" | "oneshot" => PlacementMode::OneShot,
                _ => {
                    return Err(StampError::Config(format!(
                        "Unknown placement mode: {}",
                        mode
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StampError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(StampError::Config(format!(
                "render_scale must be a positive number, got {}",
                self.render_scale
            )));
        }
        let stamp = self.stamp;
        if !(stamp.width.is_finite() && stamp.height.is_finite())
            || stamp.width <= 0.0
            || stamp.height <= 0.0
        {
            return Err(StampError::Config(format!(
                "stamp size must be a positive number of points, got {}x{}",
                self.stamp.width, self.stamp.height
            )));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| StampError::Config(format!("{} is not a number: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
