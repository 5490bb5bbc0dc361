//! Image derivatives: resized JPEG tiers, the inline blur placeholder and
//! EXIF extraction. Everything here is CPU-bound; callers run it on the
//! blocking pool.

use base64::Engine;
use exif::{In, Reader, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError};

use crate::storage::models::ExifData;

pub const THUMBNAIL_WIDTH: u32 = 320;
pub const PREVIEW_WIDTH: u32 = 768;
const PLACEHOLDER_SIZE: u32 = 10;
const PLACEHOLDER_QUALITY: u8 = 40;

/// Produced before the upload request returns.
#[derive(Debug)]
pub struct SyncDerivatives {
    pub width: u32,
    pub height: u32,
    pub thumbnail_320: Vec<u8>,
    pub placeholder: Vec<u8>,
}

/// Produced by the derivative worker.
#[derive(Debug)]
pub struct AsyncDerivatives {
    pub compressed: Vec<u8>,
    pub thumbnail_768: Vec<u8>,
}

pub fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(data)
}

/// Scale down to `width` keeping the aspect ratio. Narrower images are left
/// untouched.
pub fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
    if img.width() <= width {
        return img.clone();
    }
    let height = (u64::from(img.height()) * u64::from(width) / u64::from(img.width())).max(1);
    img.resize_exact(width, height as u32, FilterType::Lanczos3)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

pub fn sync_tier(data: &[u8], quality: u8) -> Result<SyncDerivatives, ImageError> {
    let img = decode(data)?;
    let thumbnail_320 = encode_jpeg(&resize_to_width(&img, THUMBNAIL_WIDTH), quality)?;
    let placeholder = encode_jpeg(
        &img.thumbnail(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE),
        PLACEHOLDER_QUALITY,
    )?;
    Ok(SyncDerivatives {
        width: img.width(),
        height: img.height(),
        thumbnail_320,
        placeholder,
    })
}

pub fn async_tier(data: &[u8], quality: u8) -> Result<AsyncDerivatives, ImageError> {
    let img = decode(data)?;
    Ok(AsyncDerivatives {
        compressed: encode_jpeg(&img, quality)?,
        thumbnail_768: encode_jpeg(&resize_to_width(&img, PREVIEW_WIDTH), quality)?,
    })
}

pub fn placeholder_data_uri(placeholder: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(placeholder)
    )
}

/// Best-effort EXIF read. Images without an EXIF block yield `None`.
pub fn read_exif(data: &[u8]) -> Option<ExifData> {
    let exif = Reader::new()
        .read_from_container(&mut std::io::Cursor::new(data))
        .ok()?;

    let text = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY).map(|f| {
            f.display_value()
                .to_string()
                .trim_matches('"')
                .trim()
                .to_string()
        })
    };
    let rational = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Rational(v) => v.first().map(|r| r.to_f64()),
                _ => None,
            })
            .filter(|v| v.is_finite())
    };

    Some(ExifData {
        make: text(Tag::Make),
        model: text(Tag::Model),
        date_taken: text(Tag::DateTimeOriginal).or_else(|| text(Tag::DateTime)),
        latitude: gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S'),
        longitude: gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W'),
        exposure_time: text(Tag::ExposureTime),
        f_number: rational(Tag::FNumber),
        iso: exif
            .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0)),
    })
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn gps_coordinate(exif: &exif::Exif, tag: Tag, ref_tag: Tag, negative: u8) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }

    let mut degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
    if let Some(reference) = exif.get_field(ref_tag, In::PRIMARY) {
        if let Value::Ascii(values) = &reference.value {
            if values.first().and_then(|v| v.first()) == Some(&negative) {
                degrees = -degrees;
            }
        }
    }
    degrees.is_finite().then_some(degrees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 80, 20])));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_sync_tier_dimensions() {
        let out = sync_tier(&png(1000, 500), 80).unwrap();
        assert_eq!((out.width, out.height), (1000, 500));

        let thumb = decode(&out.thumbnail_320).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (320, 160));

        let placeholder = decode(&out.placeholder).unwrap();
        assert!(placeholder.width() <= PLACEHOLDER_SIZE);
        assert!(placeholder.height() <= PLACEHOLDER_SIZE);
    }

    #[test]
    fn test_small_images_not_upscaled() {
        let out = async_tier(&png(200, 100), 80).unwrap();
        let preview = decode(&out.thumbnail_768).unwrap();
        assert_eq!((preview.width(), preview.height()), (200, 100));
    }

    #[test]
    fn test_rejects_non_image() {
        assert!(sync_tier(b"definitely not an image", 80).is_err());
    }

    #[test]
    fn test_placeholder_data_uri() {
        let uri = placeholder_data_uri(&[0xff, 0xd8, 0xff]);
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_png_has_no_exif() {
        assert!(read_exif(&png(4, 4)).is_none());
    }
}
