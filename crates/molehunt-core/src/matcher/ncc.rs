//! Zero-mean normalized cross-correlation on grayscale planes.
//!
//! Scores are in `[-1.0, 1.0]`; 1.0 is a pixel-perfect match up to
//! brightness and contrast. Window statistics come from integral images so
//! only the cross term costs a full template pass per position.
//!
//! Every placement is scored at full resolution, so the reported peak is
//! the global maximum of the score map. Rows are scored in parallel.

use image::RgbaImage;
use rayon::prelude::*;

/// Variance below which a window or template is considered flat.
const FLAT_EPSILON: f64 = 1e-6;

/// A single-channel image with `f32` luminance in `0.0..=255.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayPlane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl GrayPlane {
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let (w, h) = image.dimensions();
        let data = image
            .pixels()
            .map(|p| 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]))
            .collect();
        Self {
            width: w as usize,
            height: h as usize,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Summed-area tables of a plane and of its squares.
#[derive(Debug)]
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &GrayPlane) -> Self {
        let stride = plane.width + 1;
        let mut sum = vec![0.0f64; stride * (plane.height + 1)];
        let mut sq = vec![0.0f64; stride * (plane.height + 1)];
        for y in 0..plane.height {
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for x in 0..plane.width {
                let v = f64::from(plane.at(x, y));
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    /// (sum, sum of squares) over the `w`x`h` window at (x, y).
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let a = y * s + x;
        let b = y * s + x + w;
        let c = (y + h) * s + x;
        let d = (y + h) * s + x + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// A screen plane with its summed-area tables, shared by every template
/// searched on the same capture.
#[derive(Debug)]
pub struct SearchPlane {
    plane: GrayPlane,
    integral: Integral,
}

impl SearchPlane {
    pub fn new(plane: GrayPlane) -> Self {
        let integral = Integral::new(&plane);
        Self { plane, integral }
    }

    pub fn plane(&self) -> &GrayPlane {
        &self.plane
    }
}

/// Template with its mean removed, ready for correlation.
#[derive(Debug)]
pub struct Template {
    width: usize,
    height: usize,
    values: Vec<f64>,
    mean: f64,
    /// Sum of squared deviations.
    energy: f64,
    flat: bool,
}

impl Template {
    pub fn new(plane: &GrayPlane) -> Self {
        let n = plane.data.len().max(1) as f64;
        let mean = plane.data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let values: Vec<f64> = plane.data.iter().map(|&v| f64::from(v) - mean).collect();
        let energy: f64 = values.iter().map(|v| v * v).sum();
        Self {
            width: plane.width,
            height: plane.height,
            values,
            mean,
            energy,
            flat: energy / n < FLAT_EPSILON,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Best location found by [`best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub x: usize,
    pub y: usize,
    pub score: f64,
}

impl Peak {
    /// Higher score wins; equal scores go to the earlier raster position.
    fn better(self, other: Peak) -> Peak {
        match self.score.total_cmp(&other.score) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                if (self.y, self.x) <= (other.y, other.x) {
                    self
                } else {
                    other
                }
            }
        }
    }
}

fn score_at(screen: &SearchPlane, tpl: &Template, x: usize, y: usize) -> f64 {
    let n = (tpl.width * tpl.height) as f64;
    let (sum, sq) = screen.integral.window(x, y, tpl.width, tpl.height);
    let window_energy = (sq - sum * sum / n).max(0.0);
    let window_flat = window_energy / n < FLAT_EPSILON;

    if tpl.flat || window_flat {
        // Correlation is undefined; flat against flat compares brightness
        if tpl.flat && window_flat {
            return 1.0 - ((sum / n) - tpl.mean).abs() / 255.0;
        }
        return 0.0;
    }

    let frame = &screen.plane;
    let mut cross = 0.0f64;
    for ty in 0..tpl.height {
        let row = (y + ty) * frame.width + x;
        let frow = &frame.data[row..row + tpl.width];
        let trow = &tpl.values[ty * tpl.width..(ty + 1) * tpl.width];
        for (f, t) in frow.iter().zip(trow) {
            cross += f64::from(*f) * t;
        }
    }

    (cross / (tpl.energy * window_energy).sqrt()).clamp(-1.0, 1.0)
}

/// First maximum along one row of placements.
fn scan_row(screen: &SearchPlane, tpl: &Template, y: usize, max_x: usize) -> Peak {
    let mut best = Peak {
        x: 0,
        y,
        score: score_at(screen, tpl, 0, y),
    };
    for x in 1..=max_x {
        let score = score_at(screen, tpl, x, y);
        if score > best.score {
            best = Peak { x, y, score };
        }
    }
    best
}

/// Locate the best match of `template` inside `screen`.
///
/// Every placement is scored; ties resolve to the first in raster order.
/// Returns None when the template is empty or larger than the screen.
pub fn best_match(screen: &SearchPlane, template: &Template) -> Option<Peak> {
    let f = &screen.plane;
    if template.width == 0
        || template.height == 0
        || template.width > f.width
        || template.height > f.height
    {
        return None;
    }

    let max_x = f.width - template.width;
    let max_y = f.height - template.height;

    (0..=max_y)
        .into_par_iter()
        .map(|y| scan_row(screen, template, y, max_x))
        .reduce_with(Peak::better)
}
