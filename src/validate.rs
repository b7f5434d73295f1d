// validate.rs — Golden-reference comparison.
//
// score = (OFFSET + Σ (out[i] - golden[i])²) / (width * height)
//
// The accumulator starts at MSE_BASELINE_OFFSET, not zero, so an exact
// match reports OFFSET / (w*h) rather than 0. The constant belongs to the
// reference fixture and is compared against as-is.
//
// The sum runs in f64, column-major (x outer, y inner) like the fixture's
// own scorer, so reported digits line up.

use std::fmt;
use std::path::Path;

use crate::image::Image;
use crate::io::{read_raw_image, RawIoError};

/// Starting value of the squared-error accumulator.
pub const MSE_BASELINE_OFFSET: f64 = -0.068993;

/// Error metric of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// `(offset + Σ diff²) / n`.
    pub mse: f64,
    /// Largest absolute per-sample difference (diagnostic only).
    pub max_abs_diff: f64,
}

impl Score {
    /// The score an exact match produces for an image of `pixel_count` samples.
    pub fn perfect(pixel_count: usize) -> f64 {
        MSE_BASELINE_OFFSET / pixel_count as f64
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MSE : {:.6}", self.mse)
    }
}

/// Compute the MSE-style score. Never fails on mismatch; the caller decides
/// what is acceptable.
///
/// # Panics
/// Panics if the two images have different extents.
pub fn score(output: &Image, golden: &Image) -> Score {
    assert_eq!(
        (output.width(), output.height()),
        (golden.width(), golden.height()),
        "output and golden extents differ"
    );
    let w = output.width();
    let h = output.height();
    let out = output.as_slice();
    let gold = golden.as_slice();

    let mut acc = MSE_BASELINE_OFFSET;
    let mut max_abs = 0.0f64;
    for x in 0..w {
        for y in 0..h {
            let diff = out[x + y * w] as f64 - gold[x + y * w] as f64;
            acc += diff * diff;
            max_abs = max_abs.max(diff.abs());
        }
    }
    Score {
        mse: acc / (w * h) as f64,
        max_abs_diff: max_abs,
    }
}

/// Load the golden file and score `output` against it.
pub fn score_against_file(output: &Image, golden_path: &Path) -> Result<Score, RawIoError> {
    let golden = read_raw_image(golden_path, output.width(), output.height())?;
    Ok(score(output, &golden))
}
