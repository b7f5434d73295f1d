// tests/test_validate.rs — End-to-end golden-frame scenario on the CPU path.
//
// Writes an input frame and the expected output to a temp dir, runs the
// same load → filter → score sequence as the `bilateral` binary, and checks
// the reported score.

use bilateral_accel::bilateral::{bilateral_filter, FilterConfig};
use bilateral_accel::coefficients::gaussian_coefficients;
use bilateral_accel::image::Image;
use bilateral_accel::io::{read_raw_image, write_raw_image, RawIoError};
use bilateral_accel::validate::{score, score_against_file, Score, MSE_BASELINE_OFFSET};

fn depth_like_frame() -> Image {
    // Two planes at different depths with a ring of missing samples.
    Image::from_fn(320, 240, |x, y| {
        let dx = x as f32 - 160.0;
        let dy = y as f32 - 120.0;
        let r = (dx * dx + dy * dy).sqrt();
        if (60.0..64.0).contains(&r) {
            0.0
        } else if r < 60.0 {
            0.35 + 0.0002 * x as f32
        } else {
            0.8 - 0.0001 * y as f32
        }
    })
}

// ===== Golden scenario =====

#[test]
fn matching_golden_scores_baseline_offset() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input.bin");
    let golden_path = dir.path().join("goldenOutput.bin");

    let cfg = FilterConfig::CANONICAL;
    let g = gaussian_coefficients(cfg.radius);
    write_raw_image(&input_path, &depth_like_frame()).unwrap();
    write_raw_image(&golden_path, &bilateral_filter(&depth_like_frame(), &g, &cfg)).unwrap();

    let input = read_raw_image(&input_path, cfg.width, cfg.height).unwrap();
    let output = bilateral_filter(&input, &g, &cfg);
    let s = score_against_file(&output, &golden_path).unwrap();

    assert_eq!(s.mse, MSE_BASELINE_OFFSET / 76_800.0);
    assert_eq!(s.mse, Score::perfect(cfg.pixel_count()));
    assert_eq!(s.to_string(), "MSE : -0.000001");
}

#[test]
fn unfiltered_frame_scores_worse_than_filtered() {
    let cfg = FilterConfig::CANONICAL;
    let input = depth_like_frame();
    let golden = bilateral_filter(&input, &gaussian_coefficients(2), &cfg);

    let good = score(&golden, &golden);
    let bad = score(&input, &golden);
    assert!(bad.mse > good.mse);
    assert!(bad.max_abs_diff > 0.0);
}

#[test]
fn mismatch_is_reported_not_rejected() {
    let cfg = FilterConfig::CANONICAL;
    let golden = Image::filled(cfg.width, cfg.height, 0.5);
    let output = Image::filled(cfg.width, cfg.height, 0.6);
    let s = score(&output, &golden);
    // Σ diff² = 76 800 · 0.01 (to f32 precision).
    let expected = (MSE_BASELINE_OFFSET + 768.0) / 76_800.0;
    assert!((s.mse - expected).abs() < 1e-6, "{} vs {expected}", s.mse);
}

#[test]
fn missing_golden_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = score_against_file(&Image::new(320, 240), &dir.path().join("goldenOutput.bin")).unwrap_err();
    assert!(matches!(err, RawIoError::Open { .. }));
}
