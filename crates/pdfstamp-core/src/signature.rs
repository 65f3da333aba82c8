//! Captured signature bitmaps
//!
//! Signature pads hand over PNG data URLs with a transparent background.
//! The image is decoded once into RGBA8 and shared read-only between the
//! placements that reference it and the re-encoder.

use crate::error::{Result, StampError};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct SignatureImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl fmt::Debug for SignatureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl SignatureImage {
    /// Wrap raw RGBA8 pixels (row-major, 4 bytes per pixel)
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StampError::InvalidSignatureImage(format!(
                "empty dimensions {}x{}",
                width, height
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                StampError::InvalidSignatureImage(format!(
                    "dimensions {}x{} are too large",
                    width, height
                ))
            })?;
        if rgba.len() != expected {
            return Err(StampError::InvalidSignatureImage(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Decode a PNG of any color type into RGBA8
    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let invalid = |e: png::DecodingError| StampError::InvalidSignatureImage(e.to_string());

        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder.read_info().map_err(invalid)?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).map_err(invalid)?;
        let data = &buf[..info.buffer_size()];

        let rgba = match info.color_type {
            png::ColorType::Rgba => data.to_vec(),
            png::ColorType::Rgb => data
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
            png::ColorType::GrayscaleAlpha => data
                .chunks_exact(2)
                .flat_map(|px| [px[0], px[0], px[0], px[1]])
                .collect(),
            png::ColorType::Grayscale => data.iter().flat_map(|&g| [g, g, g, 255]).collect(),
            other => {
                return Err(StampError::InvalidSignatureImage(format!(
                    "unsupported PNG color type {:?}",
                    other
                )))
            }
        };

        Self::from_rgba(info.width, info.height, rgba)
    }

    /// Decode a `data:image/png;base64,...` URL
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url.trim().strip_prefix("data:").ok_or_else(|| {
            StampError::InvalidSignatureImage("not a data URL".to_string())
        })?;
        let (meta, payload) = rest.split_once(',').ok_or_else(|| {
            StampError::InvalidSignatureImage("data URL has no payload".to_string())
        })?;
        let mime = meta.strip_suffix(";base64").ok_or_else(|| {
            StampError::InvalidSignatureImage("data URL is not base64 encoded".to_string())
        })?;
        if !mime.eq_ignore_ascii_case("image/png") {
            return Err(StampError::InvalidSignatureImage(format!(
                "expected image/png, got {}",
                mime
            )));
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| StampError::InvalidSignatureImage(format!("bad base64: {}", e)))?;
        Self::from_png(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    /// Nothing drawn: every pixel fully transparent
    pub fn is_blank(&self) -> bool {
        self.rgba.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Any pixel that is not fully opaque
    pub fn has_transparency(&self) -> bool {
        self.rgba.chunks_exact(4).any(|px| px[3] != 255)
    }

    /// Split into a DeviceRGB plane and a DeviceGray alpha plane
    pub fn split_channels(&self) -> (Vec<u8>, Vec<u8>) {
        let pixel_count = self.width as usize * self.height as usize;
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for px in self.rgba.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        (rgb, alpha)
    }
}
