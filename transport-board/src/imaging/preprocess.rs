use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ImagingError;

/// Upscale factor applied before recognition
pub const DEFAULT_SCALE: u32 = 2;

/// Pixel counts per gray level
pub type Histogram = [u64; 256];

/// A rectangle in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        CropRect { x, y, w, h }
    }

    /// Intersects the rectangle with a `width x height` image
    pub fn clip(&self, width: u32, height: u32) -> Option<CropRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.w.min(width - self.x);
        let h = self.h.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(CropRect::new(self.x, self.y, w, h))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub scale: u32,
    /// Light markings on a dark board
    pub invert: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        PreprocessOptions {
            scale: DEFAULT_SCALE,
            invert: false,
        }
    }
}

/// A binarized image ready for the recognizer
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: GrayImage,
    pub threshold: u8,
    pub histogram: Histogram,
}

/// Upscales, grayscales and binarizes an image with an Otsu threshold
pub fn preprocess(image: &DynamicImage, options: &PreprocessOptions) -> Result<Preprocessed, ImagingError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ImagingError::EmptyImage { width, height });
    }
    if options.scale == 0 {
        return Err(ImagingError::InvalidScale(options.scale));
    }
    let (target_w, target_h) = match (width.checked_mul(options.scale), height.checked_mul(options.scale)) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(ImagingError::InvalidScale(options.scale)),
    };

    let rgb = image.to_rgb8();
    let upscaled = if options.scale == 1 {
        rgb
    } else {
        imageops::resize(&rgb, target_w, target_h, FilterType::Triangle)
    };

    let (gray, histogram) = grayscale(&upscaled);
    let threshold = otsu_threshold(&histogram);
    let image = binarize(&gray, threshold, options.invert);
    debug!(width = target_w, height = target_h, threshold, invert = options.invert, "image preprocessed");

    Ok(Preprocessed {
        image,
        threshold,
        histogram,
    })
}

/// Crops `rect` out of the original image and preprocesses only that region
pub fn preprocess_region(
    image: &DynamicImage,
    rect: CropRect,
    options: &PreprocessOptions,
) -> Result<Preprocessed, ImagingError> {
    let clipped = rect
        .clip(image.width(), image.height())
        .ok_or(ImagingError::EmptyRegion(rect))?;
    let cell = image.crop_imm(clipped.x, clipped.y, clipped.w, clipped.h);
    preprocess(&cell, options)
}

/// ITU-R 601 luma, rounded and clamped to a byte
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let value = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    value.round().clamp(0.0, 255.0) as u8
}

/// Converts to gray levels and counts them
pub fn grayscale(image: &RgbImage) -> (GrayImage, Histogram) {
    let mut histogram = [0u64; 256];
    let gray = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let value = luminance(r, g, b);
        histogram[value as usize] += 1;
        Luma([value])
    });
    (gray, histogram)
}

/// Otsu's method over a gray-level histogram.
///
/// Candidate `t` splits the levels into background `[0, t)` and foreground
/// `[t, 255]`; the first candidate with the largest between-class variance
/// wins. Histograms with fewer than two occupied levels yield 0.
///
/// Level `t` belongs to the upper class here, but [`binarize`] paints it
/// black. The first maximum is one level above the lower class, so no
/// occupied level sits on the threshold and both conventions agree.
pub fn otsu_threshold(histogram: &Histogram) -> u8 {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut weight_b: u64 = 0;
    let mut sum_b: f64 = 0.0;
    let mut best: u8 = 0;
    let mut max_variance: f64 = 0.0;

    for (t, &count) in histogram.iter().enumerate() {
        if weight_b > 0 && weight_b < total {
            let weight_f = total - weight_b;
            let mean_b = sum_b / weight_b as f64;
            let mean_f = (sum - sum_b) / weight_f as f64;
            let variance = weight_b as f64 * weight_f as f64 * (mean_b - mean_f).powi(2);
            if variance > max_variance {
                max_variance = variance;
                best = t as u8;
            }
        }
        weight_b += count;
        sum_b += t as f64 * count as f64;
    }
    best
}

/// White above the threshold, black otherwise; `invert` flips the result
pub fn binarize(gray: &GrayImage, threshold: u8, invert: bool) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let white = (pixel.0[0] > threshold) != invert;
        pixel.0[0] = if white { 255 } else { 0 };
    }
    out
}

/// Decodes an uploaded bitmap
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImagingError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Encodes a processed image as PNG for the recognizer
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
