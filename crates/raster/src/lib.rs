//! Edit pipeline for generated images: CSS-style colour filters in a fixed
//! order, then a lossless quarter turn. Alpha is never touched.

use std::io::Cursor;

use image::{imageops, ImageFormat, RgbaImage};
use shared::domain::{FilterParams, Rotation, PERCENT_NEUTRAL};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("image has no pixels")]
    EmptyImage,
}

type ColorMatrix = [[f32; 3]; 3];

#[derive(Debug, Clone, Copy)]
enum Stage {
    Brightness(f32),
    Contrast(f32),
    Matrix(ColorMatrix),
}

impl Stage {
    fn run(&self, rgb: [f32; 3]) -> [f32; 3] {
        match *self {
            Stage::Brightness(slope) => rgb.map(|c| clamp_unit(c * slope)),
            Stage::Contrast(amount) => rgb.map(|c| clamp_unit((c - 0.5) * amount + 0.5)),
            Stage::Matrix(m) => {
                let [r, g, b] = rgb;
                [
                    clamp_unit(m[0][0] * r + m[0][1] * g + m[0][2] * b),
                    clamp_unit(m[1][0] * r + m[1][1] * g + m[1][2] * b),
                    clamp_unit(m[2][0] * r + m[2][1] * g + m[2][2] * b),
                ]
            }
        }
    }
}

fn clamp_unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn percent(value: u16) -> f32 {
    f32::from(value) / 100.0
}

fn saturate_matrix(s: f32) -> ColorMatrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn grayscale_matrix(amount: f32) -> ColorMatrix {
    let k = 1.0 - amount.min(1.0);
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn sepia_matrix(amount: f32) -> ColorMatrix {
    let k = 1.0 - amount.min(1.0);
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

// Neutral stages are omitted so identity parameters never round-trip through floats.
fn colour_stages(params: &FilterParams) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(5);
    if params.brightness != PERCENT_NEUTRAL {
        stages.push(Stage::Brightness(percent(params.brightness)));
    }
    if params.contrast != PERCENT_NEUTRAL {
        stages.push(Stage::Contrast(percent(params.contrast)));
    }
    if params.saturation != PERCENT_NEUTRAL {
        stages.push(Stage::Matrix(saturate_matrix(percent(params.saturation))));
    }
    if params.grayscale != 0 {
        stages.push(Stage::Matrix(grayscale_matrix(percent(params.grayscale))));
    }
    if params.sepia != 0 {
        stages.push(Stage::Matrix(sepia_matrix(percent(params.sepia))));
    }
    stages
}

/// Runs the full edit pipeline. `source` is left untouched.
pub fn apply(source: &RgbaImage, params: &FilterParams) -> RgbaImage {
    if params.is_identity() {
        return source.clone();
    }
    let stages = colour_stages(params);
    if stages.is_empty() {
        return rotate_quarter(source, params.rotation);
    }

    let mut filtered = source.clone();
    for pixel in filtered.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let mut rgb = [r, g, b].map(|c| f32::from(c) / 255.0);
        for stage in &stages {
            rgb = stage.run(rgb);
        }
        let [r, g, b] = rgb.map(|c| (c * 255.0).round() as u8);
        pixel.0 = [r, g, b, a];
    }

    if params.rotation == Rotation::Deg0 {
        filtered
    } else {
        rotate_quarter(&filtered, params.rotation)
    }
}

pub fn rotate_quarter(source: &RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::Deg0 => source.clone(),
        Rotation::Deg90 => imageops::rotate90(source),
        Rotation::Deg180 => imageops::rotate180(source),
        Rotation::Deg270 => imageops::rotate270(source),
    }
}

pub fn crop_to_square(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    imageops::crop_imm(source, x, y, side, side).to_image()
}

pub fn decode(bytes: &[u8]) -> Result<RgbaImage, RasterError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| RasterError::Decode(err.to_string()))?
        .to_rgba8();
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(RasterError::EmptyImage);
    }
    Ok(decoded)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RasterError::EmptyImage);
    }
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| RasterError::Encode(err.to_string()))?;
    Ok(out.into_inner())
}

pub fn dimensions(bytes: &[u8]) -> Result<(u32, u32), RasterError> {
    decode(bytes).map(|image| image.dimensions())
}

pub fn render_png(bytes: &[u8], params: &FilterParams) -> Result<Vec<u8>, RasterError> {
    let source = decode(bytes)?;
    encode_png(&apply(&source, params))
}

pub fn rotate_png_clockwise(bytes: &[u8]) -> Result<Vec<u8>, RasterError> {
    let source = decode(bytes)?;
    encode_png(&rotate_quarter(&source, Rotation::Deg90))
}

pub fn crop_png_to_square(bytes: &[u8]) -> Result<Vec<u8>, RasterError> {
    let source = decode(bytes)?;
    encode_png(&crop_to_square(&source))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
