use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vialscan::{detect_blobs, ParamId, ParameterSet};

/// Textured background with bright discs scattered over a grid.
fn make_vial_fixture(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = 60.0
                + 20.0 * ((x as f32 * 0.004).sin() + (y as f32 * 0.006).cos())
                + rng.gen_range(-4.0f32..4.0f32);
            img.put_pixel(x, y, Luma([v.clamp(0.0, 255.0) as u8]));
        }
    }

    let cols = 6u32;
    let rows = 4u32;
    for r in 0..rows {
        for c in 0..cols {
            let cx = width as f32 * (c as f32 + 0.5) / cols as f32;
            let cy = height as f32 * (r as f32 + 0.5) / rows as f32;
            let radius = rng.gen_range(12.0f32..40.0f32);
            let x0 = (cx - radius).floor().max(0.0) as u32;
            let x1 = ((cx + radius).ceil() as u32).min(width - 1);
            let y0 = (cy - radius).floor().max(0.0) as u32;
            let y1 = ((cy + radius).ceil() as u32).min(height - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        img.put_pixel(x, y, Luma([230]));
                    }
                }
            }
        }
    }
    img
}

fn full_frame_params(width: u32, height: u32, blur: f64, morph: f64) -> ParameterSet {
    let mut p = ParameterSet::defaults();
    p.set(ParamId::XMin, 0.0);
    p.set(ParamId::XMax, width as f64);
    p.set(ParamId::YMin, 0.0);
    p.set(ParamId::YMax, height as f64);
    p.set(ParamId::BrightnessPercentile, 95.0);
    p.set(ParamId::MinBlobArea, 100.0);
    p.set(ParamId::MaxBlobArea, 1_000_000.0);
    p.set(ParamId::BlurSize, blur);
    p.set(ParamId::MorphKernelSize, morph);
    p
}

fn bench_detect(c: &mut Criterion) {
    let img = make_vial_fixture(1280, 960, 7);
    let small = full_frame_params(1280, 960, 5.0, 5.0).detect_params();
    let large = full_frame_params(1280, 960, 31.0, 21.0).detect_params();

    c.bench_function("detect_1280x960_k5", |b| {
        b.iter(|| {
            let det = detect_blobs(black_box(&img), black_box(&small)).expect("ROI fits");
            black_box(det.count())
        })
    });

    c.bench_function("detect_1280x960_k31_m21", |b| {
        b.iter(|| {
            let det = detect_blobs(black_box(&img), black_box(&large)).expect("ROI fits");
            black_box(det.count())
        })
    });
}

criterion_group!(pipeline, bench_detect);
criterion_main!(pipeline);
