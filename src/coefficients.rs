// coefficients.rs — Spatial weight vector for the bilateral filter.
//
// One 1D vector of 2r+1 weights is reused for both axes: the spatial term
// of the filter is `c[i + r] * c[j + r]`, i.e. a separable Gaussian.
//
// The weights are NOT normalized. The filter divides by its own
// data-dependent weight sum, so a constant scale factor cancels.

use std::ops::Index;

/// Denominator of the spatial exponent: `c[k] = exp(-(k - r)² / 32)`.
pub const SPATIAL_DENOMINATOR: f32 = 32.0;

/// Symmetric spatial weights indexed by `offset + radius`.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    weights: Vec<f32>,
    radius: usize,
}

impl Coefficients {
    /// Wrap an explicit weight vector.
    ///
    /// # Panics
    /// Panics if `weights` has even length.
    pub fn from_vec(weights: Vec<f32>) -> Self {
        assert!(
            weights.len() % 2 == 1,
            "coefficient vector length must be odd (got {})",
            weights.len()
        );
        let radius = weights.len() / 2;
        Coefficients { weights, radius }
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Number of weights (2r+1).
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Always false: even radius 0 has the single centre weight.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight for a signed offset in `[-r, r]`.
    #[inline]
    pub fn at_offset(&self, offset: isize) -> f32 {
        self.weights[(offset + self.radius as isize) as usize]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

impl Index<usize> for Coefficients {
    type Output = f32;

    #[inline]
    fn index(&self, k: usize) -> &f32 {
        &self.weights[k]
    }
}

/// Generate the spatial weights for a given filter radius.
///
/// Returns `2 * radius + 1` values, `c[k] = exp(-(k - radius)² / 32)`.
///
/// # Examples
/// ```
/// let c = bilateral_accel::coefficients::gaussian_coefficients(2);
/// assert_eq!(c.len(), 5);
/// assert_eq!(c[2], 1.0);
/// ```
pub fn gaussian_coefficients(radius: usize) -> Coefficients {
    let len = 2 * radius + 1;
    let weights = (0..len)
        .map(|k| {
            let offset = k as isize - radius as isize;
            let sq = (offset * offset) as f32;
            (-sq / SPATIAL_DENOMINATOR).exp()
        })
        .collect();
    Coefficients { weights, radius }
}
