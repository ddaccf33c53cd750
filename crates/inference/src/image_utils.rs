//! Upload validation, decoding and the image enhancement steps that run
//! before letterboxing.

use crate::config::ImageLimits;
use crate::errors::ImageError;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage, imageops::FilterType};
use std::io::Cursor;
use std::path::Path;

/// Images below this pixel count get auto-contrast before detection.
pub const AUTOCONTRAST_MAX_PIXELS: u64 = 2_000_000;
/// Fraction of each histogram tail clipped by auto-contrast.
pub const AUTOCONTRAST_CUTOFF: f32 = 0.01;

/// Check the cheap properties of an upload before decoding it.
pub fn validate_upload(
    filename: Option<&str>,
    size: usize,
    limits: &ImageLimits,
) -> Result<(), ImageError> {
    if size > limits.max_file_size {
        return Err(ImageError::TooLarge {
            size,
            max: limits.max_file_size,
        });
    }

    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ImageError::MissingFilename)?;

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    let allowed = extension.as_deref().is_some_and(|ext| {
        limits
            .allowed_extensions
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
    });
    if !allowed {
        return Err(ImageError::UnsupportedExtension {
            allowed: limits.supported_formats().join(", "),
        });
    }

    if size == 0 {
        return Err(ImageError::EmptyData);
    }

    Ok(())
}

/// Decode an uploaded image, honoring its EXIF orientation, as RGB8.
pub fn load_upload(bytes: &[u8], limits: &ImageLimits) -> Result<RgbImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    if reader.format().is_none() {
        return Err(ImageError::UnsupportedFormat);
    }

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let orientation = decoder.orientation().ok();

    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    if let Some(orientation) = orientation {
        image.apply_orientation(orientation);
    }

    let (width, height) = (image.width(), image.height());
    if width < limits.min_image_size || height < limits.min_image_size {
        return Err(ImageError::TooSmall {
            width,
            height,
            min: limits.min_image_size,
        });
    }

    tracing::debug!(width, height, "Decoded upload");
    Ok(image.into_rgb8())
}

/// Downscale so the longest side is at most `max_side`.
///
/// Returns the image and the factor applied (`1.0` when untouched).
pub fn smart_resize(image: RgbImage, max_side: u32) -> (RgbImage, f32) {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side {
        return (image, 1.0);
    }

    let scale = max_side as f32 / longest as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);

    tracing::info!(
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", new_width, new_height),
        "Downscaling large image"
    );

    let resized = image::imageops::resize(&image, new_width, new_height, FilterType::Lanczos3);
    (resized, scale)
}

/// Stretch each channel to the full range after clipping `cutoff` of the
/// histogram at both ends. Flat channels are left unchanged.
pub fn autocontrast(image: &mut RgbImage, cutoff: f32) {
    let total = image.width() as u64 * image.height() as u64;
    if total == 0 {
        return;
    }
    let clip = (total as f64 * cutoff as f64) as u64;

    let mut luts = [[0u8; 256]; 3];
    for (channel, lut) in luts.iter_mut().enumerate() {
        let mut histogram = [0u64; 256];
        for pixel in image.pixels() {
            histogram[pixel[channel] as usize] += 1;
        }
        *lut = stretch_lut(&histogram, clip);
    }

    for pixel in image.pixels_mut() {
        for (channel, lut) in luts.iter().enumerate() {
            pixel[channel] = lut[pixel[channel] as usize];
        }
    }
}

fn stretch_lut(histogram: &[u64; 256], clip: u64) -> [u8; 256] {
    let mut identity = [0u8; 256];
    for (i, v) in identity.iter_mut().enumerate() {
        *v = i as u8;
    }

    let mut seen = 0u64;
    let lo = histogram.iter().position(|&count| {
        seen += count;
        seen > clip
    });
    seen = 0;
    let hi = histogram.iter().rposition(|&count| {
        seen += count;
        seen > clip
    });

    let (Some(lo), Some(hi)) = (lo, hi) else {
        return identity;
    };
    if hi <= lo {
        return identity;
    }

    let scale = 255.0 / (hi - lo) as f32;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = ((i as f32 - lo as f32) * scale).clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Contrast enhancement as applied ahead of detection.
pub fn enhance_for_detection(image: &mut RgbImage) {
    if (image.width() as u64 * image.height() as u64) < AUTOCONTRAST_MAX_PIXELS {
        autocontrast(image, AUTOCONTRAST_CUTOFF);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    pub(crate) fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_validate_accepts_allowed_extension() {
        let limits = ImageLimits::default();
        assert!(validate_upload(Some("car.JPG"), 1024, &limits).is_ok());
        assert!(validate_upload(Some("scan.tiff"), 1024, &limits).is_ok());
    }

    #[test]
    fn test_validate_rejections() {
        let limits = ImageLimits::default();

        assert!(matches!(
            validate_upload(Some("car.jpg"), limits.max_file_size + 1, &limits),
            Err(ImageError::TooLarge { .. })
        ));
        assert!(matches!(
            validate_upload(None, 10, &limits),
            Err(ImageError::MissingFilename)
        ));
        assert!(matches!(
            validate_upload(Some("  "), 10, &limits),
            Err(ImageError::MissingFilename)
        ));
        assert!(matches!(
            validate_upload(Some("notes.txt"), 10, &limits),
            Err(ImageError::UnsupportedExtension { .. })
        ));
        assert!(matches!(
            validate_upload(Some("no_extension"), 10, &limits),
            Err(ImageError::UnsupportedExtension { .. })
        ));
        assert!(matches!(
            validate_upload(Some("car.png"), 0, &limits),
            Err(ImageError::EmptyData)
        ));
    }

    #[test]
    fn test_load_png() {
        let image = RgbImage::from_pixel(400, 330, Rgb([10, 20, 30]));
        let bytes = encode(&image, ImageFormat::Png);

        let decoded = load_upload(&bytes, &ImageLimits::default()).unwrap();
        assert_eq!(decoded.dimensions(), (400, 330));
        assert_eq!(decoded.get_pixel(5, 5), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let limits = ImageLimits::default();
        assert!(matches!(
            load_upload(b"definitely not an image", &limits),
            Err(ImageError::UnsupportedFormat)
        ));
        assert!(matches!(load_upload(&[], &limits), Err(ImageError::EmptyData)));
    }

    #[test]
    fn test_load_rejects_truncated_png() {
        let image = RgbImage::from_pixel(400, 400, Rgb([200, 0, 0]));
        let bytes = encode(&image, ImageFormat::Png);

        let result = load_upload(&bytes[..bytes.len() / 2], &ImageLimits::default());
        assert!(matches!(result, Err(ImageError::DecodeFailed(_))));
    }

    #[test]
    fn test_load_rejects_small_image() {
        let image = RgbImage::new(500, 100);
        let bytes = encode(&image, ImageFormat::Png);

        match load_upload(&bytes, &ImageLimits::default()) {
            Err(ImageError::TooSmall { width, height, min }) => {
                assert_eq!((width, height, min), (500, 100, 320));
            }
            other => panic!("expected TooSmall, got {:?}", other.map(|i| i.dimensions())),
        }
    }

    #[test]
    fn test_smart_resize_downscales_longest_side() {
        let image = RgbImage::new(5000, 2500);
        let (resized, scale) = smart_resize(image, 4096);
        assert_eq!(resized.dimensions(), (4096, 2048));
        assert!((scale - 0.8192).abs() < 1e-6);
    }

    #[test]
    fn test_smart_resize_leaves_small_images() {
        let image = RgbImage::new(1024, 768);
        let (resized, scale) = smart_resize(image, 4096);
        assert_eq!(resized.dimensions(), (1024, 768));
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn test_autocontrast_stretches_range() {
        // Left half 100, right half 150
        let mut image = RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 { Rgb([100, 100, 100]) } else { Rgb([150, 150, 150]) }
        });

        autocontrast(&mut image, AUTOCONTRAST_CUTOFF);
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(99, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_autocontrast_flat_image_unchanged() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([42, 128, 200]));
        autocontrast(&mut image, AUTOCONTRAST_CUTOFF);
        assert_eq!(image.get_pixel(3, 3), &Rgb([42, 128, 200]));
    }

    #[test]
    fn test_autocontrast_ignores_outliers() {
        // One hot pixel out of 10k is inside the 1% clip
        let mut image = RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 { Rgb([50, 50, 50]) } else { Rgb([100, 100, 100]) }
        });
        image.put_pixel(0, 0, Rgb([255, 255, 255]));

        autocontrast(&mut image, AUTOCONTRAST_CUTOFF);
        assert_eq!(image.get_pixel(99, 99), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }
}
