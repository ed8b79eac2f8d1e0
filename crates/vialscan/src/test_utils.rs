//! Shared helpers for image-based unit tests.

use image::{GrayImage, Luma};

use crate::params::{ParamId, ParameterSet};

/// Uniform background with filled bright discs.
///
/// Pixels within `radius` of a disc center get `disc_pix`.
pub(crate) fn draw_disc_image(
    w: u32,
    h: u32,
    discs: &[([f32; 2], f32)],
    disc_pix: u8,
    bg_pix: u8,
) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([bg_pix]));
    for &(center, radius) in discs {
        for y in 0..h {
            for x in 0..w {
                let dx = x as f32 - center[0];
                let dy = y as f32 - center[1];
                if dx * dx + dy * dy <= radius * radius {
                    img.put_pixel(x, y, Luma([disc_pix]));
                }
            }
        }
    }
    img
}

/// Pixel count of a disc as rasterized by [`draw_disc_image`].
pub(crate) fn disc_area(radius: f32) -> u64 {
    let r = radius.ceil() as i32;
    let mut n = 0;
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx * dx + dy * dy) as f32 <= radius * radius {
                n += 1;
            }
        }
    }
    n
}

/// Parameters covering a whole `w × h` test image with small kernels.
///
/// The 98th percentile lands inside any disc covering more than about 3%
/// of the image, so only disc interiors survive thresholding.
pub(crate) fn small_image_params(w: u32, h: u32) -> ParameterSet {
    let mut p = ParameterSet::defaults();
    p.set(ParamId::XMin, 0.0);
    p.set(ParamId::XMax, w as f64);
    p.set(ParamId::YMin, 0.0);
    p.set(ParamId::YMax, h as f64);
    p.set(ParamId::BrightnessPercentile, 98.0);
    p.set(ParamId::MinBlobArea, 50.0);
    p.set(ParamId::MaxBlobArea, 100_000.0);
    p.set(ParamId::BlurSize, 5.0);
    p.set(ParamId::MorphKernelSize, 3.0);
    p
}
