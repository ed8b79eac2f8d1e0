use image::GrayImage;

/// `p`-th percentile of all pixel values, linear interpolation between
/// closest ranks. `p` is clamped to `[0, 100]`; NaN is treated as 0.
///
/// Returns 0 for an empty image.
pub(crate) fn percentile(img: &GrayImage, p: f64) -> f64 {
    let n = img.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let mut hist = [0usize; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1;
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;

    let v_lo = value_at_rank(&hist, lo) as f64;
    let v_hi = value_at_rank(&hist, hi) as f64;
    v_lo + (v_hi - v_lo) * frac
}

/// Value of the `rank`-th smallest pixel (0-based) from a histogram.
fn value_at_rank(hist: &[usize; 256], rank: usize) -> u8 {
    let mut seen = 0usize;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

/// Foreground (255) where `pixel >= threshold`, background (0) elsewhere.
pub(crate) fn binarize(img: &GrayImage, threshold: f64) -> GrayImage {
    let (w, h) = img.dimensions();
    let data = img
        .as_raw()
        .iter()
        .map(|&v| if v as f64 >= threshold { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(w, h, data).expect("buffer dimensions match")
}
