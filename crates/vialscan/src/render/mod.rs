//! Operator-facing overlays.
//!
//! Nothing here feeds back into detection; the optimizer never renders.

mod glyphs;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{Detection, Roi};

pub(crate) use glyphs::{draw_text, GLYPH_H};

pub const ROI_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLOB_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const INFO_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Cell size of the headline count text.
const HEADLINE_SCALE: u32 = 5;
const LABEL_SCALE: u32 = 3;
const INFO_SCALE: u32 = 3;

/// Line widths and marker sizes for one kind of overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkStyle {
    pub roi_thickness: u32,
    pub circle_thickness: u32,
    pub center_radius: i32,
}

impl MarkStyle {
    /// Interactive tuning overlay.
    pub const TUNING: MarkStyle = MarkStyle {
        roi_thickness: 3,
        circle_thickness: 4,
        center_radius: 8,
    };
    /// Per-frame batch output.
    pub const FRAME: MarkStyle = MarkStyle {
        roi_thickness: 2,
        circle_thickness: 4,
        center_radius: 8,
    };
    /// Batch summary image.
    pub const SUMMARY: MarkStyle = MarkStyle {
        roi_thickness: 3,
        circle_thickness: 5,
        center_radius: 10,
    };
}

/// A circle to mark on a summary image.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub center: [u32; 2],
    pub radius: u32,
    pub label: String,
}

pub fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    image::DynamicImage::ImageLuma8(img.clone()).to_rgb8()
}

/// Rectangle outline centred on the ROI border, corners inclusive.
pub fn draw_roi(canvas: &mut RgbImage, roi: &Roi, thickness: u32) {
    let t = thickness.max(1) as i32;
    let w = roi.width() as i32;
    let h = roi.height() as i32;
    for o in -(t / 2)..=((t - 1) / 2) {
        let (rw, rh) = (w + 2 * o, h + 2 * o);
        if rw <= 0 || rh <= 0 {
            continue;
        }
        let rect =
            Rect::at(roi.x_min as i32 - o, roi.y_min as i32 - o).of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(canvas, rect, ROI_COLOR);
    }
}

/// Blob outline with a filled center dot.
pub fn draw_blob(canvas: &mut RgbImage, center: [u32; 2], radius: u32, style: &MarkStyle) {
    let c = (center[0] as i32, center[1] as i32);
    let t = style.circle_thickness.max(1) as i32;
    for o in -(t / 2)..=((t - 1) / 2) {
        let r = radius as i32 + o;
        if r > 0 {
            draw_hollow_circle_mut(canvas, c, r, BLOB_COLOR);
        }
    }
    draw_filled_circle_mut(canvas, c, style.center_radius, CENTER_COLOR);
}

/// Draw a label to the right of a blob, vertically centred on it.
fn draw_blob_label(canvas: &mut RgbImage, center: [u32; 2], radius: u32, gap: i32, text: &str) {
    let x = center[0] as i32 + radius as i32 + gap;
    let y = center[1] as i32 - (GLYPH_H * LABEL_SCALE) as i32 / 2;
    draw_text(canvas, text, x, y, LABEL_SCALE, BLOB_COLOR);
}

/// Headline above the ROI; red when something was found, green otherwise.
fn draw_headline(canvas: &mut RgbImage, roi: &Roi, text: &str, found: bool) {
    let color = if found { BLOB_COLOR } else { ROI_COLOR };
    let y = roi.y_min as i32 - 50 - (GLYPH_H * HEADLINE_SCALE) as i32;
    draw_text(canvas, text, roi.x_min as i32, y, HEADLINE_SCALE, color);
}

/// Tuning overlay: ROI, numbered blobs and the total count.
pub fn render_detection(image: &GrayImage, detection: &Detection) -> RgbImage {
    let mut out = gray_to_rgb(image);
    let style = MarkStyle::TUNING;
    draw_roi(&mut out, &detection.roi, style.roi_thickness);
    for (i, blob) in detection.blobs.iter().enumerate() {
        draw_blob(&mut out, blob.center, blob.radius, &style);
        draw_blob_label(&mut out, blob.center, blob.radius, 10, &format!("#{}", i + 1));
    }
    let n = detection.count();
    draw_headline(&mut out, &detection.roi, &format!("DROPLETS DETECTED: {n}"), n > 0);
    out
}

/// Batch frame: ROI, blobs labelled with their area, frame number and count.
///
/// `frame_no` is 1-based.
pub fn render_frame(image: &GrayImage, detection: &Detection, frame_no: usize) -> RgbImage {
    let mut out = gray_to_rgb(image);
    let style = MarkStyle::FRAME;
    draw_roi(&mut out, &detection.roi, style.roi_thickness);
    for blob in &detection.blobs {
        draw_blob(&mut out, blob.center, blob.radius, &style);
        draw_blob_label(&mut out, blob.center, blob.radius, 10, &format!("{}PX", blob.area));
    }
    draw_text(&mut out, &format!("FRAME {frame_no}"), 20, 20, INFO_SCALE, INFO_COLOR);
    let line2_y = 20 + (GLYPH_H * INFO_SCALE) as i32 + 15;
    draw_text(
        &mut out,
        &format!("DROPLETS: {}", detection.count()),
        20,
        line2_y,
        INFO_SCALE,
        INFO_COLOR,
    );
    out
}

/// Batch summary: every marker plus a headline with the marker count.
///
/// Without an ROI the headline goes to the top-left corner.
pub fn render_summary(image: &GrayImage, roi: Option<&Roi>, markers: &[Marker]) -> RgbImage {
    let mut out = gray_to_rgb(image);
    let style = MarkStyle::SUMMARY;
    if let Some(roi) = roi {
        draw_roi(&mut out, roi, style.roi_thickness);
    }
    for m in markers {
        draw_blob(&mut out, m.center, m.radius, &style);
        draw_blob_label(&mut out, m.center, m.radius, 15, &m.label);
    }
    let headline = if markers.is_empty() {
        "NO DROPLETS DETECTED".to_string()
    } else {
        format!("DROPLETS DETECTED: {}", markers.len())
    };
    match roi {
        Some(roi) => draw_headline(&mut out, roi, &headline, !markers.is_empty()),
        None => {
            let color = if markers.is_empty() { ROI_COLOR } else { BLOB_COLOR };
            draw_text(&mut out, &headline, 20, 20, HEADLINE_SCALE, color);
        }
    }
    out
}
