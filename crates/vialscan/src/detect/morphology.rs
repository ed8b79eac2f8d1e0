//! Binary morphology with an elliptical structuring element.
//!
//! Masks are `GrayImage`s holding 0 (background) or 255 (foreground).
//! Each row of the element is a horizontal span, so a pass costs one prefix
//! sum per image row plus `k` span lookups per pixel.

use image::GrayImage;

/// Elliptical structuring element of odd size `k`.
///
/// Row `dy ∈ [-r, r]` covers columns `[-dx, dx]` with
/// `dx = round(sqrt(r² - dy²))` and `r = k / 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EllipseElement {
    radius: usize,
    half_widths: Vec<usize>,
}

impl EllipseElement {
    pub(crate) fn new(k: usize) -> Self {
        let r = k / 2;
        let r2 = (r * r) as f64;
        let half_widths = (0..=2 * r)
            .map(|i| {
                let dy = i as f64 - r as f64;
                (r2 - dy * dy).max(0.0).sqrt().round() as usize
            })
            .collect();
        Self {
            radius: r,
            half_widths,
        }
    }

    /// Dense `k × k` rendering (255 inside), mostly for inspection.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn to_image(&self) -> GrayImage {
        let k = (2 * self.radius + 1) as u32;
        let r = self.radius as i64;
        GrayImage::from_fn(k, k, |x, y| {
            let hw = self.half_widths[y as usize] as i64;
            let dx = x as i64 - r;
            image::Luma([if dx.abs() <= hw { 255 } else { 0 }])
        })
    }
}

/// Per-row prefix counts of foreground pixels; row stride is `w + 1`.
fn row_prefix_counts(mask: &GrayImage) -> Vec<u32> {
    let (w, h) = mask.dimensions();
    let (w, h) = (w as usize, h as usize);
    let raw = mask.as_raw();
    let mut pre = vec![0u32; (w + 1) * h];
    for y in 0..h {
        let row = &raw[y * w..(y + 1) * w];
        let out = &mut pre[y * (w + 1)..(y + 1) * (w + 1)];
        for x in 0..w {
            out[x + 1] = out[x] + u32::from(row[x] != 0);
        }
    }
    pre
}

#[derive(Clone, Copy)]
enum Op {
    Dilate,
    Erode,
}

fn apply(mask: &GrayImage, se: &EllipseElement, op: Op) -> GrayImage {
    let (w, h) = mask.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let pre = row_prefix_counts(mask);
    let r = se.radius as i64;
    let mut out = vec![0u8; wu * hu];

    for y in 0..hu as i64 {
        for x in 0..wu as i64 {
            let mut hit = matches!(op, Op::Erode);
            for (i, &hw) in se.half_widths.iter().enumerate() {
                let yy = y + i as i64 - r;
                // Pixels outside the mask never decide the outcome.
                if yy < 0 || yy >= hu as i64 {
                    continue;
                }
                let x0 = (x - hw as i64).max(0) as usize;
                let x1 = ((x + hw as i64).min(wu as i64 - 1)) as usize;
                let base = yy as usize * (wu + 1);
                let count = pre[base + x1 + 1] - pre[base + x0];
                match op {
                    Op::Dilate if count > 0 => {
                        hit = true;
                        break;
                    }
                    Op::Erode if count as usize != x1 + 1 - x0 => {
                        hit = false;
                        break;
                    }
                    _ => {}
                }
            }
            if hit {
                out[y as usize * wu + x as usize] = 255;
            }
        }
    }
    GrayImage::from_raw(w, h, out).expect("buffer dimensions match")
}

pub(crate) fn dilate(mask: &GrayImage, se: &EllipseElement) -> GrayImage {
    apply(mask, se, Op::Dilate)
}

pub(crate) fn erode(mask: &GrayImage, se: &EllipseElement) -> GrayImage {
    apply(mask, se, Op::Erode)
}

/// Closing: `iterations` dilations followed by as many erosions.
pub(crate) fn close(mask: &GrayImage, se: &EllipseElement, iterations: usize) -> GrayImage {
    let mut m = mask.clone();
    for _ in 0..iterations {
        m = dilate(&m, se);
    }
    for _ in 0..iterations {
        m = erode(&m, se);
    }
    m
}

/// Opening: `iterations` erosions followed by as many dilations.
pub(crate) fn open(mask: &GrayImage, se: &EllipseElement, iterations: usize) -> GrayImage {
    let mut m = mask.clone();
    for _ in 0..iterations {
        m = erode(&m, se);
    }
    for _ in 0..iterations {
        m = dilate(&m, se);
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_mask(w: u32, h: u32, density: f64, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(w, h, |_, _| {
            Luma([if rng.gen_bool(density) { 255 } else { 0 }])
        })
    }

    #[test]
    fn ellipse_rows_match_expected_shape() {
        let se = EllipseElement::new(5);
        let rows: Vec<Vec<u8>> = se
            .to_image()
            .rows()
            .map(|r| r.map(|p| u8::from(p[0] != 0)).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![0, 0, 1, 0, 0],
                vec![1, 1, 1, 1, 1],
                vec![1, 1, 1, 1, 1],
                vec![1, 1, 1, 1, 1],
                vec![0, 0, 1, 0, 0],
            ]
        );
        assert_eq!(EllipseElement::new(1).half_widths, vec![0]);
    }

    #[test]
    fn matches_imageproc_reference_morphology() {
        for (k, seed) in [(3usize, 1u64), (5, 2), (7, 3), (9, 4)] {
            let se = EllipseElement::new(k);
            let c = (k / 2) as u8;
            let reference_mask = Mask::from_image(&se.to_image(), c, c);
            let img = random_mask(37, 23, 0.3, seed);

            assert_eq!(
                dilate(&img, &se),
                grayscale_dilate(&img, &reference_mask),
                "dilate k={k}"
            );
            assert_eq!(
                erode(&img, &se),
                grayscale_erode(&img, &reference_mask),
                "erode k={k}"
            );
        }
    }

    #[test]
    fn closing_bridges_a_narrow_gap() {
        let mut img = GrayImage::new(30, 11);
        for y in 3..8 {
            for x in 3..13 {
                img.put_pixel(x, y, Luma([255]));
            }
            for x in 15..27 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let closed = close(&img, &EllipseElement::new(3), 1);
        assert_eq!(closed.get_pixel(13, 5)[0], 255);
        assert_eq!(closed.get_pixel(14, 5)[0], 255);
    }

    #[test]
    fn opening_removes_specks_and_keeps_large_regions() {
        let mut img = GrayImage::new(40, 40);
        img.put_pixel(5, 5, Luma([255]));
        img.put_pixel(6, 5, Luma([255]));
        for y in 15..35 {
            for x in 15..35 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let opened = open(&img, &EllipseElement::new(5), 2);
        assert_eq!(opened.get_pixel(5, 5)[0], 0);
        assert_eq!(opened.get_pixel(25, 25)[0], 255);
    }

    #[test]
    fn erosion_treats_outside_as_foreground() {
        let img = GrayImage::from_pixel(8, 8, Luma([255]));
        let eroded = erode(&img, &EllipseElement::new(5));
        assert!(eroded.pixels().all(|p| p[0] == 255));
        let empty = GrayImage::new(8, 8);
        assert!(dilate(&empty, &EllipseElement::new(5))
            .pixels()
            .all(|p| p[0] == 0));
    }
}
