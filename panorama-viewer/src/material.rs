//! Texture/material builder
//!
//! Turns a resolved asset into a material the scene can carry. Decoding never
//! fails outward: anything that cannot become a texture becomes the fallback
//! gradient instead.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::resolver::ResolvedAsset;

/// Size the fallback gradient is rasterised at for GPU upload
pub const FALLBACK_UPLOAD_SIZE: (u32, u32) = (512, 256);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image has zero area")]
    EmptyImage,
}

/// Which faces the rasteriser discards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shading {
    /// Texture colour is output as-is, no lighting
    Unlit,
    Lit,
}

/// Fixed-function state a panorama surface is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialParams {
    pub double_sided: bool,
    pub cull: CullFace,
    pub shading: Shading,
    pub depth_write: bool,
}

impl MaterialParams {
    /// Rules for a surface viewed from inside
    pub const INTERIOR: MaterialParams = MaterialParams {
        double_sided: true,
        cull: CullFace::Front,
        shading: Shading::Unlit,
        depth_write: false,
    };
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self::INTERIOR
    }
}

/// Deterministic sky-to-ground gradient shown when no image is available
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientFallback {
    pub sky: [u8; 3],
    pub horizon: [u8; 3],
    pub ground: [u8; 3],
    /// Height of the horizon band as a fraction of the image height
    pub band: f32,
}

impl Default for GradientFallback {
    fn default() -> Self {
        Self {
            sky: [92, 140, 196],
            horizon: [214, 214, 206],
            ground: [78, 72, 66],
            band: 0.06,
        }
    }
}

impl GradientFallback {
    /// Colour at normalised height `t` (0 = top, 1 = bottom)
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        let half_band = self.band.clamp(0.0, 1.0) * 0.5;
        let upper = 0.5 - half_band;
        let lower = 0.5 + half_band;

        if t < upper {
            lerp_rgb(self.sky, self.horizon, t / upper)
        } else if t <= lower {
            self.horizon
        } else {
            lerp_rgb(self.horizon, self.ground, (t - lower) / (1.0 - lower))
        }
    }

    /// Rasterise to RGBA; every column is identical
    pub fn rasterize(&self, width: u32, height: u32) -> RgbaImage {
        let width = width.max(1);
        let height = height.max(1);
        let denom = (height - 1).max(1) as f32;
        let rows: Vec<[u8; 3]> = (0..height).map(|y| self.sample(y as f32 / denom)).collect();
        RgbaImage::from_fn(width, height, |_, y| {
            let [r, g, b] = rows[y as usize];
            Rgba([r, g, b, 255])
        })
    }
}

fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

/// Surface appearance of the panorama geometry
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Texture(Arc<RgbaImage>),
    Gradient(GradientFallback),
}

impl Material {
    pub fn fallback() -> Self {
        Material::Gradient(GradientFallback::default())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Material::Gradient(_))
    }

    /// Whether both materials draw the same pixels without comparing them
    pub fn same_source(&self, other: &Material) -> bool {
        match (self, other) {
            (Material::Texture(a), Material::Texture(b)) => Arc::ptr_eq(a, b),
            (Material::Gradient(a), Material::Gradient(b)) => a == b,
            _ => false,
        }
    }

    pub fn params(&self) -> MaterialParams {
        MaterialParams::INTERIOR
    }

    /// Width / height of the texture, if any
    pub fn aspect(&self) -> Option<f32> {
        match self {
            Material::Texture(img) => Some(img.width() as f32 / img.height() as f32),
            Material::Gradient(_) => None,
        }
    }

    /// Pixels to upload to the GPU
    pub fn upload_image(&self) -> Arc<RgbaImage> {
        match self {
            Material::Texture(img) => Arc::clone(img),
            Material::Gradient(gradient) => {
                let (w, h) = FALLBACK_UPLOAD_SIZE;
                Arc::new(gradient.rasterize(w, h))
            }
        }
    }
}

/// Build a material from a resolution outcome
pub fn build(asset: &ResolvedAsset, max_dimension: u32) -> Material {
    match asset {
        ResolvedAsset::Bytes(bytes) => match decode(bytes, max_dimension) {
            Ok(img) => Material::Texture(Arc::new(img)),
            Err(e) => {
                tracing::warn!("{}; using fallback material", e);
                Material::fallback()
            }
        },
        ResolvedAsset::Failure(_) => Material::fallback(),
    }
}

/// Decode to RGBA8, downscaling so neither side exceeds `max_dimension`
pub fn decode(bytes: &[u8], max_dimension: u32) -> Result<RgbaImage, MaterialError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| MaterialError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(MaterialError::EmptyImage);
    }

    let max_dimension = max_dimension.max(1);
    if width <= max_dimension && height <= max_dimension {
        return Ok(img);
    }

    let scale = max_dimension as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, max_dimension);
    tracing::debug!(width, height, new_width, new_height, "downscaling panorama");
    Ok(image::imageops::resize(&img, new_width, new_height, FilterType::Triangle))
}
