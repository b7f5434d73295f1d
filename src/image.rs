// image.rs — Flat grayscale image container for the bilateral filter.
//
// LAYOUT
// ──────
// Row-major, contiguous, no stride padding:
//
//   index = x + y * width
//
//   data index:  0  1  2  3 | 4  5  6  7 | 8  9 10 11
//   row:         |- row 0 -| |- row 1 -| |- row 2 -|
//
// The same flat layout is what the raw `input.bin` / `goldenOutput.bin`
// files contain and what the GPU storage buffers hold, so an `Image` can be
// uploaded or compared without any repacking.
//
// SENTINEL
// ────────
// A sample of exactly 0.0 means "no data". The container does not enforce
// this; the filter does (see bilateral.rs).

use std::fmt;

/// A 2D `f32` intensity image with runtime dimensions.
#[derive(Clone)]
pub struct Image {
    /// Samples in row-major order. Length = width * height.
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Image {
    // --- Constructors ---

    /// Create an image filled with the 0.0 sentinel.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Create an image where every sample has the same value.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Create an image from an existing sample vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of samples (width * height).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the sample data in bytes, as stored in a device buffer.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Get the sample at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.bounds_check(x, y);
        self.data[x + y * self.width]
    }

    /// Set the sample at (x, y).
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.bounds_check(x, y);
        self.data[x + y * self.width] = value;
    }

    /// Borrow a single row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Iterate over all samples as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    /// The samples as a flat slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the flat samples.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the image and return its sample vector.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Largest absolute per-sample difference against another image of the
    /// same extent. Used to report CPU/GPU agreement.
    ///
    /// # Panics
    /// Panics if the extents differ.
    pub fn max_abs_diff(&self, other: &Image) -> f32 {
        assert_eq!(
            (self.width, self.height),
            (other.width, other.height),
            "extent mismatch: {}×{} vs {}×{}",
            self.width,
            self.height,
            other.width,
            other.height,
        );
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| (a - b).abs())
            .fold(0.0f32, f32::max)
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

// Debug formatting — prints the top-left corner, useful for small test images.
impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image {{ {}×{} }}", self.width, self.height)?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// img[(x, y)] syntax.
impl std::ops::Index<(usize, usize)> for Image {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &f32 {
        self.bounds_check(x, y);
        &self.data[x + y * self.width]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Image {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut f32 {
        self.bounds_check(x, y);
        let idx = x + y * self.width;
        &mut self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_all_sentinel() {
        let img = Image::new(4, 3);
        assert_eq!(img.len(), 12);
        assert!(img.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_row_major_index() {
        // 3×2:
        //  [1, 2, 3]
        //  [4, 5, 6]
        let img = Image::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(img.get(0, 0), 1.0);
        assert_eq!(img.get(2, 0), 3.0);
        assert_eq!(img.get(0, 1), 4.0);
        assert_eq!(img[(1, 1)], 5.0);
        assert_eq!(img.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_from_fn_matches_set() {
        let a = Image::from_fn(5, 4, |x, y| (x * 10 + y) as f32);
        let mut b = Image::new(5, 4);
        for y in 0..4 {
            for x in 0..5 {
                b.set(x, y, (x * 10 + y) as f32);
            }
        }
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_pixels_coordinates() {
        let img = Image::from_fn(3, 2, |x, y| (x + 3 * y) as f32);
        for (x, y, v) in img.pixels() {
            assert_eq!(v, (x + 3 * y) as f32);
        }
        assert_eq!(img.pixels().count(), 6);
    }

    #[test]
    fn test_clone_is_deep_copy() {
        let a = Image::from_fn(3, 2, |x, y| (x + 10 * y) as f32);
        let mut b = a.clone();
        b.set(1, 1, -1.0);
        assert_eq!(a.get(1, 1), 11.0);
        assert_eq!((b.width(), b.height()), (3, 2));
        assert_eq!(a.max_abs_diff(&b), 12.0);
    }

    #[test]
    fn test_byte_len() {
        let img = Image::new(320, 240);
        assert_eq!(img.byte_len(), 320 * 240 * 4);
    }

    #[test]
    fn test_max_abs_diff() {
        let a = Image::from_vec(2, 1, vec![1.0, 2.0]);
        let b = Image::from_vec(2, 1, vec![1.5, 1.0]);
        assert_eq!(a.max_abs_diff(&b), 1.0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds_panics() {
        let img = Image::new(2, 2);
        img.get(2, 0);
    }

    #[test]
    #[should_panic(expected = "data length")]
    fn test_from_vec_wrong_length_panics() {
        Image::from_vec(2, 2, vec![0.0; 3]);
    }
}
