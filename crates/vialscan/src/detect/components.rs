use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Label image; 0 is background.
pub(crate) type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Per-component statistics in mask coordinates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ComponentStats {
    pub label: u32,
    pub area: u64,
    pub centroid: [f64; 2],
    /// Inclusive bounding box `[x0, y0, x1, y1]`.
    pub bbox: [u32; 4],
}

/// 8-connected labelling of a binary mask.
///
/// Components come back in raster order of their first pixel.
pub(crate) fn label_components(mask: &GrayImage) -> (LabelImage, Vec<ComponentStats>) {
    let labels = if mask.width() * mask.height() == 1 {
        // imageproc's union-find asserts on a single-pixel image.
        LabelImage::from_pixel(1, 1, Luma([u32::from(mask.as_raw()[0] != 0)]))
    } else {
        connected_components(mask, Connectivity::Eight, Luma([0u8]))
    };
    let (w, _) = labels.dimensions();

    struct Acc {
        first: usize,
        area: u64,
        sx: u64,
        sy: u64,
        bbox: [u32; 4],
    }
    let mut acc: Vec<Option<Acc>> = Vec::new();
    for (i, &l) in labels.as_raw().iter().enumerate() {
        if l == 0 {
            continue;
        }
        let l = l as usize;
        if acc.len() <= l {
            acc.resize_with(l + 1, || None);
        }
        let x = (i % w as usize) as u32;
        let y = (i / w as usize) as u32;
        let a = acc[l].get_or_insert(Acc {
            first: i,
            area: 0,
            sx: 0,
            sy: 0,
            bbox: [x, y, x, y],
        });
        a.area += 1;
        a.sx += x as u64;
        a.sy += y as u64;
        a.bbox[0] = a.bbox[0].min(x);
        a.bbox[1] = a.bbox[1].min(y);
        a.bbox[2] = a.bbox[2].max(x);
        a.bbox[3] = a.bbox[3].max(y);
    }

    let mut stats: Vec<(usize, ComponentStats)> = acc
        .into_iter()
        .enumerate()
        .filter_map(|(label, a)| {
            let a = a?;
            Some((
                a.first,
                ComponentStats {
                    label: label as u32,
                    area: a.area,
                    centroid: [a.sx as f64 / a.area as f64, a.sy as f64 / a.area as f64],
                    bbox: a.bbox,
                },
            ))
        })
        .collect();
    stats.sort_by_key(|(first, _)| *first);
    (labels, stats.into_iter().map(|(_, s)| s).collect())
}

/// Length of the closed outer boundary of one labelled component.
pub(crate) fn outer_perimeter(labels: &LabelImage, comp: &ComponentStats) -> f64 {
    let [x0, y0, x1, y1] = comp.bbox;
    // One pixel of padding so the contour tracer never touches the border.
    let w = x1 - x0 + 3;
    let h = y1 - y0 + 3;
    let patch = GrayImage::from_fn(w, h, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= w - 2 && y <= h - 2;
        if inside && labels.get_pixel(x0 + x - 1, y0 + y - 1)[0] == comp.label {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    find_contours::<i32>(&patch)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| closed_length(&c.points))
        .fold(0.0, f64::max)
}

fn closed_length(points: &[imageproc::point::Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let dx = (b.x - a.x) as f64;
        let dy = (b.y - a.y) as f64;
        total += (dx * dx + dy * dy).sqrt();
    }
    total
}

/// `4πA / P²`, or 0 when the perimeter vanishes.
pub(crate) fn circularity(area: u64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * std::f64::consts::PI * area as f64 / (perimeter * perimeter)
}
