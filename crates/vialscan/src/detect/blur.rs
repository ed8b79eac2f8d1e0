use image::{GrayImage, ImageBuffer, Luma};

/// Fixed binomial kernels used for small sizes.
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// Sigma derived from an odd kernel size.
pub(crate) fn sigma_for_kernel(k: usize) -> f64 {
    0.3 * ((k as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1D Gaussian kernel of odd length `k`.
pub(crate) fn gaussian_kernel(k: usize) -> Vec<f32> {
    debug_assert!(k % 2 == 1, "kernel size must be odd");
    if k <= 7 {
        return SMALL_KERNELS[k / 2].to_vec();
    }
    let sigma = sigma_for_kernel(k);
    let scale = -0.5 / (sigma * sigma);
    let c = (k as f64 - 1.0) * 0.5;
    let raw: Vec<f64> = (0..k)
        .map(|i| {
            let x = i as f64 - c;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Index into `[0, n)` mirrored about the edge pixels (`dcb|abcd|cba`).
fn reflect_101(i: i64, n: i64) -> u32 {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - m }) as u32
}

/// Separable Gaussian blur with an odd `k × k` kernel.
///
/// Runs in `f32` and rounds back to 8-bit. Borders reflect about the edge
/// pixel without repeating it, matching OpenCV's default.
pub(crate) fn gaussian_blur(img: &GrayImage, k: usize) -> GrayImage {
    if k <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let r = (k / 2) as u32;
    let padded = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w + 2 * r, h + 2 * r, |x, y| {
        let sx = reflect_101(x as i64 - r as i64, w as i64);
        let sy = reflect_101(y as i64 - r as i64, h as i64);
        Luma([img.get_pixel(sx, sy)[0] as f32])
    });
    let kernel = gaussian_kernel(k);
    let blurred = imageproc::filter::separable_filter_equal(&padded, &kernel);
    GrayImage::from_fn(w, h, |x, y| {
        let v = blurred.get_pixel(x + r, y + r)[0];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kernels_are_normalized_and_symmetric() {
        for k in [1usize, 3, 5, 7, 9, 15, 51] {
            let kern = gaussian_kernel(k);
            assert_eq!(kern.len(), k);
            let sum: f32 = kern.iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
            for i in 0..k / 2 {
                assert_relative_eq!(kern[i], kern[k - 1 - i], epsilon = 1e-7);
            }
            // Peak at the center.
            assert!(kern.iter().all(|&v| v <= kern[k / 2]));
        }
    }

    #[test]
    fn sigma_follows_kernel_size() {
        assert_relative_eq!(sigma_for_kernel(9), 1.7, epsilon = 1e-12);
        assert_relative_eq!(sigma_for_kernel(51), 7.7, epsilon = 1e-12);
    }

    #[test]
    fn flat_image_is_unchanged() {
        let img = GrayImage::from_pixel(40, 30, Luma([137]));
        let out = gaussian_blur(&img, 11);
        assert!(out.pixels().all(|p| p[0] == 137));
    }

    #[test]
    fn reflect_index_skips_the_edge_pixel() {
        let idx: Vec<u32> = (-3..8).map(|i| reflect_101(i, 5)).collect();
        assert_eq!(idx, vec![3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1]);
        assert!((-4..4).all(|i| reflect_101(i, 1) == 0));
    }

    #[test]
    fn border_reflects_instead_of_replicating() {
        let mut img = GrayImage::new(6, 5);
        for y in 0..5 {
            img.put_pixel(0, y, Luma([255]));
        }
        let out = gaussian_blur(&img, 3);
        // Column -1 mirrors column 1 (dark), so x=0 keeps only the center tap.
        // Replicating the edge would give 191 here.
        assert!((0..5).all(|y| out.get_pixel(0, y)[0] == 128));
        assert!((0..5).all(|y| out.get_pixel(1, y)[0] == 64));
        assert!((0..5).all(|y| out.get_pixel(2, y)[0] == 0));
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut img = GrayImage::new(21, 21);
        img.put_pixel(10, 10, Luma([255]));
        let out = gaussian_blur(&img, 5);
        // 255 * 0.375^2 = 35.86
        assert_eq!(out.get_pixel(10, 10)[0], 36);
        assert_eq!(out.get_pixel(12, 10)[0], 6);
        assert_eq!(out.get_pixel(13, 10)[0], 0);
    }
}
