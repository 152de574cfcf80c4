//! Image normalization: decode, bounded resize, lossy re-encode.
//!
//! Also extracts embedded capture metadata (timestamp, GPS) from the
//! original bytes before any resizing touches them.

use std::io::Cursor;

use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

use crate::error::{FloralogError, Result};
use crate::observation::{Location, LocationSource};

/// Normalizer tuning. Defaults match the documented pipeline contract.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Cap for the longer output dimension, in pixels.
    pub max_dimension: u32,
    /// First-pass JPEG quality on a 0-1 scale.
    pub initial_quality: f32,
    /// Soft budget for the encoded output size, in bytes.
    pub size_budget: usize,
    /// Quality below which the re-encode retry is not attempted.
    pub min_retry_quality: f32,
    /// Quality reduction applied on the single retry.
    pub quality_step: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_dimension: 256,
            initial_quality: 0.8,
            size_budget: 100 * 1024,
            min_retry_quality: 0.5,
            quality_step: 0.1,
        }
    }
}

/// Output of [`normalize`]: encoded bytes plus the final geometry.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// JPEG-encoded bytes. Input to the content hash.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality the accepted encode ran at (0-1 scale).
    pub quality: f32,
}

/// Capture metadata embedded in the original image bytes.
#[derive(Debug, Clone, Default)]
pub struct CaptureMetadata {
    /// Embedded capture time as a Unix timestamp (seconds).
    pub captured_at: Option<i64>,
    /// Embedded GPS position, tagged with `exif` provenance.
    pub location: Option<Location>,
}

/// Decode, orient, resize, and re-encode a raw image.
///
/// The longer dimension is capped at `config.max_dimension` preserving
/// aspect ratio; small images are not upscaled. Output is JPEG at
/// `initial_quality`. If the encoded size exceeds `size_budget` and the
/// quality is still above `min_retry_quality`, one re-encode runs at
/// `quality - quality_step`; the result is accepted either way. Corrupt
/// or unsupported input fails with a decode error.
pub fn normalize(raw: &[u8], config: &NormalizerConfig) -> Result<NormalizedImage> {
    let decoded = image::load_from_memory(raw)
        .map_err(|e| FloralogError::DecodeError(format!("failed to decode image: {}", e)))?;

    // Phone photos carry their rotation in EXIF rather than in the pixels.
    let orientation = read_exif_orientation(raw);
    let decoded = apply_orientation(decoded, orientation);

    let rgb = decoded.to_rgb8();
    let (src_w, src_h) = (rgb.width(), rgb.height());
    let (out_w, out_h) = compute_fit_dimensions(src_w, src_h, config.max_dimension);

    let resized = if (out_w, out_h) == (src_w, src_h) {
        rgb
    } else {
        image::imageops::resize(&rgb, out_w, out_h, FilterType::CatmullRom)
    };

    let mut quality = config.initial_quality;
    let mut data = encode_jpeg(&resized, quality)?;

    if data.len() > config.size_budget && quality > config.min_retry_quality {
        quality -= config.quality_step;
        data = encode_jpeg(&resized, quality)?;
        if data.len() > config.size_budget {
            tracing::debug!(
                size = data.len(),
                budget = config.size_budget,
                "normalized image still over budget after retry, accepting"
            );
        }
    }

    Ok(NormalizedImage {
        data,
        width: out_w,
        height: out_h,
        quality,
    })
}

/// Extract embedded capture timestamp and GPS position.
///
/// Runs over the original pre-resize bytes; resizing strips the tags.
/// Missing or unreadable metadata yields `None` fields, never an error.
pub fn extract_capture_metadata(raw: &[u8]) -> CaptureMetadata {
    let mut cursor = Cursor::new(raw);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return CaptureMetadata::default(),
    };

    let captured_at = ascii_field(&reader, exif::Tag::DateTimeOriginal)
        .or_else(|| ascii_field(&reader, exif::Tag::DateTime))
        .and_then(|s| parse_exif_datetime(&s));

    let latitude = gps_coordinate(&reader, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef);
    let longitude = gps_coordinate(&reader, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef);

    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => {
            // Horizontal positioning error when tagged, altitude otherwise.
            let accuracy = rational_field(&reader, exif::Tag::GPSHPositioningError)
                .or_else(|| rational_field(&reader, exif::Tag::GPSAltitude));
            Some(Location {
                latitude,
                longitude,
                accuracy,
                source: LocationSource::Exif,
            })
        }
        _ => None,
    };

    CaptureMetadata {
        captured_at,
        location,
    }
}

/// Scale dimensions so the longer edge fits `max_dimension`, preserving
/// aspect ratio. Small images are left alone.
pub fn compute_fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }

    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }

    let scale = max_dimension as f32 / longest as f32;
    let new_w = ((width as f32 * scale).round() as u32).max(1).min(max_dimension);
    let new_h = ((height as f32 * scale).round() as u32).max(1).min(max_dimension);
    (new_w, new_h)
}

fn encode_jpeg(img: &RgbImage, quality: f32) -> Result<Vec<u8>> {
    let quality_pct = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let mut cursor = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality_pct);
    img.write_with_encoder(encoder)
        .map_err(|e| FloralogError::EncodeError(format!("JPEG encoding failed: {}", e)))?;
    Ok(cursor.into_inner())
}

/// EXIF orientation tag, 1 (normal) when no EXIF or tag is present.
fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

fn apply_orientation(img: image::DynamicImage, orientation: u32) -> image::DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn ascii_field(reader: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = reader.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(items) => items
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

/// "YYYY:MM:DD HH:MM:SS" per the EXIF spec, interpreted as UTC.
fn parse_exif_datetime(s: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Degrees/minutes/seconds rationals folded to signed decimal degrees.
fn gps_coordinate(reader: &exif::Exif, tag: exif::Tag, ref_tag: exif::Tag) -> Option<f64> {
    let field = reader.get_field(tag, exif::In::PRIMARY)?;
    let degrees = match &field.value {
        exif::Value::Rational(parts) if parts.len() >= 3 => {
            parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0
        }
        _ => return None,
    };

    let reference = reader
        .get_field(ref_tag, exif::In::PRIMARY)
        .and_then(|f| match &f.value {
            exif::Value::Ascii(items) => items
                .first()
                .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
            _ => None,
        });

    let sign = match reference.as_deref() {
        Some("S") | Some("W") => -1.0,
        _ => 1.0,
    };
    Some(sign * degrees)
}

fn rational_field(reader: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    let field = reader.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Rational(parts) => parts.first().map(|r| r.to_f64()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ImageHash;
    use image::Rgb;

    /// Encode a flat-color JPEG test image of the given dimensions.
    fn make_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([90, 140, 70]));
        encode_jpeg(&img, 0.9).expect("encode test image")
    }

    #[test]
    fn test_fit_landscape() {
        assert_eq!(compute_fit_dimensions(4000, 3000, 256), (256, 192));
    }

    #[test]
    fn test_fit_portrait() {
        assert_eq!(compute_fit_dimensions(1500, 3000, 256), (128, 256));
    }

    #[test]
    fn test_fit_square() {
        assert_eq!(compute_fit_dimensions(2000, 2000, 256), (256, 256));
    }

    #[test]
    fn test_fit_small_image_untouched() {
        assert_eq!(compute_fit_dimensions(100, 50, 256), (100, 50));
    }

    #[test]
    fn test_fit_zero_dimensions_clamped() {
        let (w, h) = compute_fit_dimensions(0, 0, 256);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_normalize_caps_longer_dimension() {
        let raw = make_test_jpeg(4000, 3000);
        let normalized = normalize(&raw, &NormalizerConfig::default()).expect("normalize");

        assert!(normalized.width.max(normalized.height) <= 256);
        assert_eq!(normalized.width, 256);
        assert_eq!(normalized.height, 192);
        assert!(normalized.data.len() <= 100 * 1024);
    }

    #[test]
    fn test_normalize_output_decodes_as_jpeg() {
        let raw = make_test_jpeg(800, 600);
        let normalized = normalize(&raw, &NormalizerConfig::default()).expect("normalize");

        let format = image::guess_format(&normalized.data).expect("guess format");
        assert_eq!(format, image::ImageFormat::Jpeg);
        let reopened = image::load_from_memory(&normalized.data).expect("decode output");
        assert_eq!(reopened.width(), 256);
        assert_eq!(reopened.height(), 192);
    }

    #[test]
    fn test_normalize_small_image_not_upscaled() {
        let raw = make_test_jpeg(120, 80);
        let normalized = normalize(&raw, &NormalizerConfig::default()).expect("normalize");

        assert_eq!(normalized.width, 120);
        assert_eq!(normalized.height, 80);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = make_test_jpeg(1000, 700);
        let a = normalize(&raw, &NormalizerConfig::default()).expect("normalize");
        let b = normalize(&raw, &NormalizerConfig::default()).expect("normalize");

        assert_eq!(a.data, b.data);
        assert_eq!(
            ImageHash::from_bytes(&a.data),
            ImageHash::from_bytes(&b.data)
        );
    }

    #[test]
    fn test_normalize_rejects_corrupt_input() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(64);
        let err = normalize(&garbage, &NormalizerConfig::default()).unwrap_err();
        assert!(matches!(err, FloralogError::DecodeError(_)));
    }

    #[test]
    fn test_normalize_rejects_empty_input() {
        let err = normalize(&[], &NormalizerConfig::default()).unwrap_err();
        assert!(matches!(err, FloralogError::DecodeError(_)));
    }

    #[test]
    fn test_single_retry_reduces_quality_once() {
        // An impossible budget forces the retry path; the result is still
        // accepted after exactly one quality step down.
        let config = NormalizerConfig {
            size_budget: 10,
            ..NormalizerConfig::default()
        };
        let raw = make_test_jpeg(500, 500);
        let normalized = normalize(&raw, &config).expect("normalize");

        assert!((normalized.quality - 0.7).abs() < 1e-6);
        assert!(normalized.data.len() > config.size_budget);
    }

    #[test]
    fn test_no_retry_below_quality_floor() {
        let config = NormalizerConfig {
            size_budget: 10,
            initial_quality: 0.5,
            ..NormalizerConfig::default()
        };
        let raw = make_test_jpeg(500, 500);
        let normalized = normalize(&raw, &config).expect("normalize");

        assert!((normalized.quality - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_metadata_absent_without_exif() {
        let raw = make_test_jpeg(64, 64);
        let metadata = extract_capture_metadata(&raw);
        assert!(metadata.captured_at.is_none());
        assert!(metadata.location.is_none());
    }

    #[test]
    fn test_metadata_on_garbage_is_empty_not_error() {
        let metadata = extract_capture_metadata(b"not an image at all");
        assert!(metadata.captured_at.is_none());
        assert!(metadata.location.is_none());
    }

    #[test]
    fn test_exif_datetime_parsing() {
        assert_eq!(
            parse_exif_datetime("2023:06:15 14:30:00"),
            Some(1_686_839_400)
        );
        assert_eq!(parse_exif_datetime("not a date"), None);
        assert_eq!(parse_exif_datetime(""), None);
    }

    #[test]
    fn test_orientation_rotate_swaps_dimensions() {
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let rotated = apply_orientation(img, 6);
        assert_eq!((rotated.width(), rotated.height()), (20, 10));
    }

    #[test]
    fn test_orientation_identity_and_unknown() {
        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let same = apply_orientation(img, 1);
        assert_eq!((same.width(), same.height()), (10, 20));

        let img = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 20, Rgb([0, 0, 0])));
        let unknown = apply_orientation(img, 42);
        assert_eq!((unknown.width(), unknown.height()), (10, 20));
    }
}
