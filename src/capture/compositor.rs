//! Flattening a transparent surface onto an opaque background.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage, imageops};
use tracing::{debug, trace};

use super::Surface;
use crate::color::ColorValue;
use crate::error::{PanelError, Result};

/// A flattened frame, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Composites frames through one reusable off-screen target.
///
/// The target is reallocated only when the surface size changes. It is
/// mutable state, so one compositor serves one capture session at a time.
#[derive(Debug)]
pub struct ExportCompositor {
    fallback: ColorValue,
    icc_profile: Option<Vec<u8>>,
    target: Option<RgbaImage>,
    allocations: u64,
}

impl ExportCompositor {
    pub fn new(fallback: ColorValue) -> Self {
        Self {
            fallback: fallback.opaque(),
            icc_profile: None,
            target: None,
            allocations: 0,
        }
    }

    /// Embed `profile` in every frame where the encoder supports it.
    #[must_use]
    pub fn with_icc_profile(mut self, profile: Vec<u8>) -> Self {
        self.icc_profile = Some(profile);
        self
    }

    /// How many times the off-screen target has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// First non-transparent color in the chain, forced opaque.
    pub fn resolve_background(&self, chain: &[ColorValue]) -> ColorValue {
        chain
            .iter()
            .find(|c| !c.is_transparent())
            .map_or(self.fallback, |c| c.opaque())
    }

    /// Draw the background then the surface, and encode the result.
    pub fn flatten(&mut self, surface: &dyn Surface) -> Result<EncodedFrame> {
        let source = surface.snapshot()?;
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(PanelError::Surface(format!("surface is {width}x{height}")));
        }
        let background: Rgba<u8> = self.resolve_background(&surface.background_chain()).into();

        let target = match self.target.take() {
            Some(mut target) if target.dimensions() == (width, height) => {
                for pixel in target.pixels_mut() {
                    *pixel = background;
                }
                target
            }
            previous => {
                self.allocations += 1;
                debug!(
                    width,
                    height,
                    previous = ?previous.map(|t| t.dimensions()),
                    "Allocating off-screen target"
                );
                RgbaImage::from_pixel(width, height, background)
            }
        };
        let target = self.target.insert(target);
        imageops::overlay(target, &source, 0, 0);

        let png = encode(self.icc_profile.as_deref(), target)?;
        trace!(width, height, bytes = png.len(), "Frame flattened");
        Ok(EncodedFrame { png, width, height })
    }
}

/// Prefer the color-managed path; fall back when the encoder cannot embed a profile.
fn encode(icc_profile: Option<&[u8]>, image: &RgbaImage) -> Result<Vec<u8>> {
    if let Some(profile) = icc_profile {
        match encode_png(image, Some(profile)) {
            Err(PanelError::EncodeUnsupported(reason)) => {
                debug!(%reason, "Color-managed encoding unavailable, falling back");
            }
            other => return other,
        }
    }
    encode_png(image, None)
}

fn encode_png(image: &RgbaImage, icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = PngEncoder::new(&mut out);
    if let Some(profile) = icc_profile {
        encoder
            .set_icc_profile(profile.to_vec())
            .map_err(|e| PanelError::EncodeUnsupported(e.to_string()))?;
    }
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
        .map_err(|e| PanelError::Encode(e.to_string()))?;
    Ok(out)
}
