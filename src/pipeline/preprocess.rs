//! Image conditioning before optical recognition.
//!
//! Normalises to 8-bit RGB, then applies +20 % contrast and +10 % sharpness.
//! Both enhancements are the classic "blend with a degenerate image" form:
//! `out = degenerate + factor × (in − degenerate)`, where the degenerate
//! image is a flat field at the mean luminance (contrast) or a 3×3 smoothed
//! copy (sharpness). Pure and deterministic.

use image::{DynamicImage, RgbImage};

pub const CONTRAST_FACTOR: f32 = 1.2;
pub const SHARPNESS_FACTOR: f32 = 1.1;

/// Smoothing kernel used as the sharpness baseline; weights sum to 13.
const SMOOTH_KERNEL: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
const SMOOTH_WEIGHT: u32 = 13;

/// Condition an image for OCR.
pub fn preprocess(image: &DynamicImage) -> RgbImage {
    let rgb = image.to_rgb8();
    let rgb = enhance_contrast(&rgb, CONTRAST_FACTOR);
    enhance_sharpness(&rgb, SHARPNESS_FACTOR)
}

/// Scale every channel's distance from the mean luminance by `factor`.
pub fn enhance_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luminance(img) as f32;
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = blend(mean, *c as f32, factor);
        }
    }
    out
}

/// Scale every interior pixel's distance from its smoothed value by
/// `factor`. The one-pixel border is left unchanged.
pub fn enhance_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0u32; 3];
            for (ky, row) in SMOOTH_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let p = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for (a, v) in acc.iter_mut().zip(p.0) {
                        *a += weight * v as u32;
                    }
                }
            }
            let original = img.get_pixel(x, y).0;
            let target = out.get_pixel_mut(x, y);
            for ch in 0..3 {
                let smoothed = (acc[ch] + SMOOTH_WEIGHT / 2) / SMOOTH_WEIGHT;
                target.0[ch] = blend(smoothed as f32, original[ch] as f32, factor);
            }
        }
    }
    out
}

/// Rounded mean of ITU-R 601 luma over the whole image.
fn mean_luminance(img: &RgbImage) -> u8 {
    let n = img.width() as u64 * img.height() as u64;
    if n == 0 {
        return 0;
    }
    let sum: u64 = img
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            ((r as u64 * 19595 + g as u64 * 38470 + b as u64 * 7471 + 0x8000) >> 16) as u64
        })
        .sum();
    ((sum + n / 2) / n) as u8
}

fn blend(degenerate: f32, value: f32, factor: f32) -> u8 {
    (degenerate + factor * (value - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn uniform_image_is_unchanged() {
        let img = RgbImage::from_pixel(8, 8, Rgb([120, 120, 120]));
        let out = preprocess(&DynamicImage::ImageRgb8(img.clone()));
        assert_eq!(out, img);
    }

    #[test]
    fn grayscale_input_becomes_rgb() {
        let gray = GrayImage::from_pixel(4, 4, Luma([200]));
        let out = preprocess(&DynamicImage::ImageLuma8(gray));
        assert_eq!(out.get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn contrast_spreads_values_around_the_mean() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([200, 200, 200]));
        // Mean luminance is 150: 100 → 90, 200 → 210.
        let out = enhance_contrast(&img, 1.2);
        assert_eq!(out.get_pixel(0, 0), &Rgb([90, 90, 90]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([210, 210, 210]));
    }

    #[test]
    fn contrast_clamps_to_channel_range() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let out = enhance_contrast(&img, 2.0);
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn sharpness_boosts_an_isolated_dot_and_keeps_the_border() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]));
        img.put_pixel(1, 1, Rgb([130, 130, 130]));
        // Smoothed centre is 130 × 5 / 13 = 50, so 50 + 1.5 × 80 = 170.
        let out = enhance_sharpness(&img, 1.5);
        assert_eq!(out.get_pixel(1, 1), &Rgb([170, 170, 170]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn tiny_images_skip_sharpening() {
        let img = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        assert_eq!(enhance_sharpness(&img, 1.1), img);
    }
}
