// src/services/image_processor.rs
use crate::errors::PosterError;
use crate::models::{NormalizedImage, ReferenceImage};
use image::imageops::{self, FilterType};
use image::io::{Limits, Reader};
use image::{
    DynamicImage, GenericImageView, ImageError, ImageFormat as ImgFormat, Rgba, RgbaImage,
};
use log::debug;
use std::io::Cursor;

/// Thumbnails taller than this are scaled down before compositing.
pub const MAX_THUMB_HEIGHT: u32 = 512;

/// Uploads wider or taller than this are refused before decoding.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Upper bound on the rescaled reference strip, in pixels.
pub const MAX_CANVAS_PIXELS: u64 = 4096 * 4096;

pub const CANVAS_BACKGROUND: Rgba<u8> = Rgba([245, 245, 245, 255]);

/// Where one thumbnail lands on the reference strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripLayout {
    pub placements: Vec<Placement>,
    pub width: u32,
    pub height: u32,
}

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Decode whatever the upload is (the declared type is ignored) and re-encode as PNG.
    pub fn normalize(&self, upload: &ReferenceImage) -> Result<NormalizedImage, PosterError> {
        let img = decode(&upload.data, &upload.filename)?;
        let (width, height) = img.dimensions();
        let png = encode_png(&img)?;

        debug!(
            "Normalized {} ({:?}, {} bytes) to {}x{} PNG",
            upload.filename,
            upload.content_type,
            upload.data.len(),
            width,
            height
        );

        Ok(NormalizedImage { png, width, height })
    }

    /// Lay the images out left to right and scale the strip to `target_width`.
    pub fn compose(
        &self,
        images: &[NormalizedImage],
        target_width: u32,
    ) -> Result<NormalizedImage, PosterError> {
        if images.len() < 2 {
            return Err(PosterError::ImageProcessing(format!(
                "compositing needs at least 2 images, got {}",
                images.len()
            )));
        }

        let layout = strip_layout(images.iter().map(|i| (i.width, i.height)));
        let target_width = target_width.max(1);
        let target_height = scale_dimension(layout.height, target_width, layout.width);

        // Thumbnails are drawn straight at the output scale; the native strip is never allocated.
        if u64::from(target_width) * u64::from(target_height) > MAX_CANVAS_PIXELS {
            return Err(PosterError::Validation(format!(
                "reference images are too narrow to combine ({}x{} strip at {}px wide)",
                layout.width, layout.height, target_width
            )));
        }

        let mut canvas = RgbaImage::from_pixel(target_width, target_height, CANVAS_BACKGROUND);
        for (image, slot) in images.iter().zip(&layout.placements) {
            let x = scale_offset(slot.x, target_width, layout.width);
            let right = scale_offset(slot.x + slot.width, target_width, layout.width);
            let width = right.saturating_sub(x).max(1);
            let height = scale_dimension(slot.height, target_width, layout.width);

            let decoded = decode(&image.png, "reference")?;
            let thumb = if (width, height) == decoded.dimensions() {
                decoded.to_rgba8()
            } else {
                decoded.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
            };
            imageops::overlay(&mut canvas, &thumb, i64::from(x), 0);
        }
        let strip = DynamicImage::ImageRgba8(canvas);

        debug!(
            "Composed {} references into {}x{} strip, rescaled to {}x{}",
            images.len(),
            layout.width,
            layout.height,
            target_width,
            target_height
        );

        Ok(NormalizedImage {
            png: encode_png(&strip)?,
            width: target_width,
            height: target_height,
        })
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Thumbnail sizes and x offsets for a strip. Heights are only ever reduced.
pub fn strip_layout(dims: impl IntoIterator<Item = (u32, u32)>) -> StripLayout {
    let mut placements = Vec::new();
    let mut x = 0u32;
    let mut height = MAX_THUMB_HEIGHT;

    for (w, h) in dims {
        let (thumb_w, thumb_h) = if h > MAX_THUMB_HEIGHT {
            (scale_dimension(w, MAX_THUMB_HEIGHT, h), MAX_THUMB_HEIGHT)
        } else {
            (w.max(1), h.max(1))
        };
        placements.push(Placement { x, width: thumb_w, height: thumb_h });
        x = x.saturating_add(thumb_w);
        height = height.max(thumb_h);
    }

    StripLayout { placements, width: x.max(1), height }
}

/// `value * numerator / denominator`, rounded, never below 1.
fn scale_dimension(value: u32, numerator: u32, denominator: u32) -> u32 {
    scale_offset(value, numerator, denominator).max(1)
}

/// `value * numerator / denominator`, rounded.
fn scale_offset(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(numerator);
    let denominator = u64::from(denominator.max(1));
    ((scaled + denominator / 2) / denominator).min(u64::from(u32::MAX)) as u32
}

fn decode(data: &[u8], filename: &str) -> Result<DynamicImage, PosterError> {
    let filename = if filename.trim().is_empty() { "upload" } else { filename };

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);

    let decoded = Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(ImageError::IoError)
        .and_then(|mut reader| {
            reader.limits(limits);
            reader.decode()
        });

    decoded.map_err(|e| {
        debug!("Failed to decode {}: {}", filename, e);
        match e {
            ImageError::Limits(_) => PosterError::PayloadTooLarge(format!(
                "{} exceeds {}px on a side",
                filename, MAX_SOURCE_DIMENSION
            )),
            _ => PosterError::UnsupportedImage { filename: filename.to_string() },
        }
    })
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PosterError> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImgFormat::Png)
        .map_err(|e| PosterError::ImageProcessing(format!("Failed to encode PNG: {}", e)))?;
    Ok(output)
}
