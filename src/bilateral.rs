// bilateral.rs — CPU reference bilateral filter.
//
// This is the authoritative implementation: the WGSL kernel in
// shaders/bilateral.wgsl computes the same function and is validated
// against this one.
//
// Per output pixel (x, y), with centre value c = in[x, y]:
//
//   c == 0                → out = 0                (sentinel short-circuit)
//   otherwise, for i, j in [-r, r]:
//       p = in[clamp(x+i), clamp(y+j)]
//       p <= 0            → skipped               (sentinel exclusion)
//       w = g[i+r] · g[j+r] · exp(-(p - c)² / 0.02)
//       Σw·p, Σw
//   out = Σw·p / Σw
//
// The denominator depends on the data, so this is a normalized (non-linear)
// convolution: across an intensity edge the range term collapses and the
// far side stops contributing.
//
// BORDER HANDLING: clamp (replicate edge pixels), in signed arithmetic.
// Coordinates left of column 0 read column 0, never column width-1.
//
// LOOP ORDER
// i (x offset) is the outer loop and j (y offset) the inner loop. f32
// addition is not associative, so the GPU kernel keeps the same order.

use rayon::prelude::*;

use crate::coefficients::Coefficients;
use crate::image::Image;
use crate::plan::PixelMapping;

/// Bandwidth of the range (intensity-similarity) term.
pub const RANGE_BANDWIDTH: f32 = 0.02;

/// Immutable parameters of one filter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub width: usize,
    pub height: usize,
    pub radius: usize,
}

impl FilterConfig {
    /// 320×240 frame, 5×5 footprint.
    pub const CANONICAL: FilterConfig = FilterConfig {
        width: 320,
        height: 240,
        radius: 2,
    };

    /// # Panics
    /// Panics if `width` or `height` is zero.
    pub fn new(width: usize, height: usize, radius: usize) -> Self {
        assert!(width > 0 && height > 0, "image must be non-empty ({width}×{height})");
        FilterConfig { width, height, radius }
    }

    /// Number of samples in one image.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Length of the coefficient vector (2r+1).
    #[inline]
    pub fn coefficient_len(&self) -> usize {
        2 * self.radius + 1
    }

    /// Neighbourhood footprint side length (2r+1).
    #[inline]
    pub fn footprint(&self) -> usize {
        self.coefficient_len()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Filter `input` into a freshly allocated image.
pub fn bilateral_filter(input: &Image, coeffs: &Coefficients, cfg: &FilterConfig) -> Image {
    let mut out = Image::new(cfg.width, cfg.height);
    bilateral_filter_into(&mut out, input, coeffs, cfg, PixelMapping::default());
    out
}

/// Filter `input` into `out`. Writes every sample of `out`; does not allocate.
///
/// # Panics
/// Panics if either image does not match `cfg`'s extent, or if the
/// coefficient vector length is not `2 * cfg.radius + 1`.
pub fn bilateral_filter_into(
    out: &mut Image,
    input: &Image,
    coeffs: &Coefficients,
    cfg: &FilterConfig,
    mapping: PixelMapping,
) {
    assert_eq!(
        (input.width(), input.height()),
        (cfg.width, cfg.height),
        "input extent does not match filter config"
    );
    assert_eq!(
        (out.width(), out.height()),
        (cfg.width, cfg.height),
        "output extent does not match filter config"
    );
    assert_eq!(
        coeffs.len(),
        cfg.coefficient_len(),
        "coefficient vector length must be 2 * radius + 1"
    );

    let src = input.as_slice();
    let g = coeffs.as_slice();

    match mapping {
        PixelMapping::Sequential => {
            for (y, row) in out.as_mut_slice().chunks_mut(cfg.width).enumerate() {
                filter_row(row, y, src, g, cfg);
            }
        }
        PixelMapping::RowParallel => {
            out.as_mut_slice()
                .par_chunks_mut(cfg.width)
                .enumerate()
                .for_each(|(y, row)| filter_row(row, y, src, g, cfg));
        }
    }
}

/// Compute one output row. `row` is exclusively owned by the caller's task.
#[inline]
fn filter_row(row: &mut [f32], y: usize, src: &[f32], g: &[f32], cfg: &FilterConfig) {
    for (x, dst) in row.iter_mut().enumerate() {
        *dst = filter_pixel(src, g, cfg, x, y);
    }
}

/// Filter a single pixel. Exposed for tests that probe individual
/// neighbourhoods.
pub fn filter_pixel(src: &[f32], g: &[f32], cfg: &FilterConfig, x: usize, y: usize) -> f32 {
    let w = cfg.width;
    let center = src[x + y * w];
    if center == 0.0 {
        return 0.0;
    }

    let r = cfg.radius as isize;
    let max_x = (cfg.width - 1) as isize;
    let max_y = (cfg.height - 1) as isize;

    let mut sum_weight = 0.0f32;
    let mut sum_value = 0.0f32;

    for i in -r..=r {
        let cx = (x as isize + i).clamp(0, max_x) as usize;
        let gi = g[(i + r) as usize];
        for j in -r..=r {
            let cy = (y as isize + j).clamp(0, max_y) as usize;
            let pix = src[cx + cy * w];
            if pix <= 0.0 {
                continue;
            }
            let d = pix - center;
            let weight = gi * g[(j + r) as usize] * (-(d * d) / RANGE_BANDWIDTH).exp();
            sum_value += weight * pix;
            sum_weight += weight;
        }
    }

    // A positive centre always contributes g[r]² · exp(0) to the sum.
    debug_assert!(center < 0.0 || sum_weight > 0.0, "zero weight sum at ({x},{y})");

    if sum_weight > 0.0 {
        sum_value / sum_weight
    } else {
        // Only reachable for a negative centre with no positive neighbour.
        0.0
    }
}
