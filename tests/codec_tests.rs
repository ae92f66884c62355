use inpaintd::codec::{decode_rgb, encode_png};
use inpaintd::config::Limits;
use inpaintd::{InpaintError, Raster};

fn test_limits() -> Limits {
    Limits {
        max_image_dimension: 2048,
        max_payload_bytes: 10 * 1024 * 1024,
        request_budget_ms: 5_000,
        worker_pool_size: 2,
        queue_depth: 4,
    }
}

#[test]
fn png_round_trip_preserves_pixels() {
    let mut raster = Raster::filled(3, 2, [0, 0, 0]);
    raster.set_pixel(0, 0, [255, 0, 0]);
    raster.set_pixel(1, 0, [0, 255, 0]);
    raster.set_pixel(2, 1, [0, 0, 255]);

    let bytes = encode_png(&raster).expect("encode");
    let decoded = decode_rgb(&bytes, &test_limits()).expect("decode");

    assert_eq!(decoded, raster);
}

#[test]
fn malformed_bytes_fail_with_invalid_image() {
    let err = decode_rgb(b"definitely not an image", &test_limits()).expect_err("garbage bytes");
    assert!(matches!(err, InpaintError::InvalidImage(_)));
}

#[test]
fn oversized_payload_fails_validation_before_decoding() {
    let mut limits = test_limits();
    limits.max_payload_bytes = 8;
    let err = decode_rgb(&[0u8; 64], &limits).expect_err("payload too large");
    assert!(matches!(err, InpaintError::Validation(_)));
}

#[test]
fn oversized_image_is_downscaled_to_the_dimension_cap() {
    let raster = Raster::filled(64, 32, [10, 20, 30]);
    let bytes = encode_png(&raster).expect("encode");

    let mut limits = test_limits();
    limits.max_image_dimension = 16;
    let decoded = decode_rgb(&bytes, &limits).expect("decode");

    assert!(decoded.width() <= 16);
    assert!(decoded.height() <= 16);
    // Aspect ratio is preserved within rounding.
    assert_eq!(decoded.width(), 16);
    assert_eq!(decoded.height(), 8);
}
