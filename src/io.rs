// io.rs — Raw little-endian f32 image files (`input.bin`, `goldenOutput.bin`).
//
// Format: exactly width * height samples, 4 bytes each, little-endian,
// row-major, no header. A file of the wrong size is rejected rather than
// silently truncated or zero-padded.

use std::fs;
use std::path::{Path, PathBuf};

use crate::image::Image;

/// Errors reading or writing raw float image files.
#[derive(Debug, thiserror::Error)]
pub enum RawIoError {
    #[error("failed to open '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' holds {actual} bytes, expected {expected} ({width}×{height} f32 samples)", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
        width: usize,
        height: usize,
    },
}

/// Decode little-endian f32 samples from raw bytes.
///
/// Trailing bytes that do not form a whole sample are ignored; callers
/// check the length first.
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Encode f32 samples as little-endian bytes.
pub fn encode_f32_le(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Load a `width × height` raw f32 image.
pub fn read_raw_image(path: &Path, width: usize, height: usize) -> Result<Image, RawIoError> {
    let bytes = fs::read(path).map_err(|source| RawIoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let expected = width * height * std::mem::size_of::<f32>();
    if bytes.len() != expected {
        return Err(RawIoError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len(),
            width,
            height,
        });
    }
    log::debug!("read {} samples from {}", width * height, path.display());
    Ok(Image::from_vec(width, height, decode_f32_le(&bytes)))
}

/// Write an image as raw little-endian f32.
pub fn write_raw_image(path: &Path, img: &Image) -> Result<(), RawIoError> {
    fs::write(path, encode_f32_le(img.as_slice())).map_err(|source| RawIoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("wrote {} samples to {}", img.len(), path.display());
    Ok(())
}
