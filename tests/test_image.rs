// tests/test_image.rs — Integration tests for Image and raw frame files.
//
// These run with `cargo test --test test_image`.
// Integration tests only see the crate's public API.

use bilateral_accel::image::Image;
use bilateral_accel::io::{decode_f32_le, encode_f32_le, read_raw_image, write_raw_image, RawIoError};

// ===== Image construction & basic access =====

#[test]
fn image_new_zero_initialized() {
    let img = Image::new(320, 240);
    assert_eq!(img.width(), 320);
    assert_eq!(img.height(), 240);
    assert_eq!(img.len(), 76_800);
    assert_eq!(img.byte_len(), 307_200);
    assert!(img.as_slice().iter().all(|&v| v == 0.0));
}

#[test]
fn image_from_vec_layout() {
    // 3×2 image, row-major, index x + y*width:
    //  [0.1, 0.2, 0.3]
    //  [0.4, 0.5, 0.6]
    let img = Image::from_vec(3, 2, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    assert_eq!(img.get(0, 0), 0.1);
    assert_eq!(img.get(2, 0), 0.3);
    assert_eq!(img.get(0, 1), 0.4);
    assert_eq!(img[(2, 1)], 0.6);
    assert_eq!(img.row(1), &[0.4, 0.5, 0.6]);
}

#[test]
fn image_pixels_visits_row_major() {
    let img = Image::from_fn(2, 2, |x, y| (x + 10 * y) as f32);
    let coords: Vec<(usize, usize, f32)> = img.pixels().collect();
    assert_eq!(coords, vec![(0, 0, 0.0), (1, 0, 1.0), (0, 1, 10.0), (1, 1, 11.0)]);
}

#[test]
#[should_panic]
fn image_from_vec_wrong_length_panics() {
    Image::from_vec(4, 4, vec![0.0; 15]);
}

// ===== Raw f32 files =====

#[test]
fn raw_bytes_are_little_endian() {
    let bytes = encode_f32_le(&[0.5, -2.0]);
    assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x3F, 0x00, 0x00, 0x00, 0xC0]);
    assert_eq!(decode_f32_le(&bytes), vec![0.5, -2.0]);
}

#[test]
fn raw_frame_written_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.bin");
    let img = Image::from_fn(320, 240, |x, y| ((x * 3 + y) % 17) as f32 / 17.0);

    write_raw_image(&path, &img).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 320 * 240 * 4);

    let back = read_raw_image(&path, 320, 240).unwrap();
    assert_eq!(back.max_abs_diff(&img), 0.0);
}

#[test]
fn raw_frame_too_long_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goldenOutput.bin");
    std::fs::write(&path, vec![0u8; 320 * 240 * 4 + 4]).unwrap();

    match read_raw_image(&path, 320, 240) {
        Err(RawIoError::SizeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, 307_200);
            assert_eq!(actual, 307_204);
        }
        other => panic!("expected SizeMismatch, got {other:?}"),
    }
}
