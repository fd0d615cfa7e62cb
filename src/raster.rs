use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbImage};

use crate::surface::{EncodedImage, ImageEncoding};
use crate::types::Mm;

/// Preprocessed raster: the encoded supersampled pixel buffer plus the
/// logical fit-within dimensions used for page layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    pub image: EncodedImage,
    pub width: Mm,
    pub height: Mm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// PNG output larger than this many bytes falls back to JPEG.
    pub lossless_byte_ceiling: usize,
    pub jpeg_quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            lossless_byte_ceiling: 2_000_000,
            jpeg_quality: 95,
        }
    }
}

// Supersampling aims the larger target dimension at this many pixels, within
// a 2x-4x factor, so small placements still rasterize sharply in print.
const QUALITY_TARGET: f32 = 300.0;
const SUPERSAMPLE_MIN: f32 = 2.0;
const SUPERSAMPLE_MAX: f32 = 4.0;

/// Resamples `bytes` to fit within `max_width` x `max_height` preserving
/// aspect ratio, composites alpha onto white, and encodes PNG-first with a
/// quality-bounded JPEG fallback.
///
/// Returns `None` on any decode failure; the caller is expected to continue
/// without the image.
pub fn preprocess(
    bytes: &[u8],
    max_width: Mm,
    max_height: Mm,
    options: &RasterOptions,
) -> Option<PreprocessedImage> {
    let decoded = match image::guess_format(bytes) {
        Ok(format) => image::load_from_memory_with_format(bytes, format),
        Err(_) => image::load_from_memory(bytes),
    };
    let decoded = match decoded {
        Ok(decoded) => decoded,
        Err(err) => {
            log::warn!("image decode failed, block will be omitted: {err}");
            return None;
        }
    };

    let source_width = decoded.width();
    let source_height = decoded.height();
    if source_width == 0 || source_height == 0 {
        log::warn!("image has a zero dimension, block will be omitted");
        return None;
    }

    let (width, height) = fit_within(
        source_width as f32,
        source_height as f32,
        max_width.to_f32(),
        max_height.to_f32(),
    );

    let scale = (QUALITY_TARGET / width.max(height)).clamp(SUPERSAMPLE_MIN, SUPERSAMPLE_MAX);
    let pixel_width = ((width * scale).round() as u32).max(1);
    let pixel_height = ((height * scale).round() as u32).max(1);

    let rgba = decoded.to_rgba8();
    let resampled = image::imageops::resize(
        &rgba,
        pixel_width,
        pixel_height,
        image::imageops::FilterType::Lanczos3,
    );
    let rgb = flatten_onto_white(&resampled);

    let image = encode(&rgb, pixel_width, pixel_height, options)?;
    Some(PreprocessedImage {
        image,
        width: Mm::from_f32(width),
        height: Mm::from_f32(height),
    })
}

/// Fit-within scaling: sources already inside the box keep their dimensions
/// (never upscaled); larger sources are clamped on the tighter axis and the
/// other axis follows the aspect ratio.
fn fit_within(width: f32, height: f32, max_width: f32, max_height: f32) -> (f32, f32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let aspect = width / height;
    if width / max_width > height / max_height {
        (max_width, max_width / aspect)
    } else {
        (max_height * aspect, max_height)
    }
}

fn flatten_onto_white(rgba: &image::RgbaImage) -> RgbImage {
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = src[3] as u16;
        let inverse = 255 - alpha;
        for channel in 0..3 {
            let blended = (src[channel] as u16 * alpha + 255 * inverse + 127) / 255;
            dst[channel] = blended as u8;
        }
    }
    out
}

fn encode(
    rgb: &RgbImage,
    pixel_width: u32,
    pixel_height: u32,
    options: &RasterOptions,
) -> Option<EncodedImage> {
    let mut png = Vec::new();
    let lossless_ok = PngEncoder::new(&mut png)
        .write_image(rgb.as_raw(), pixel_width, pixel_height, ColorType::Rgb8.into())
        .is_ok();
    if lossless_ok && png.len() <= options.lossless_byte_ceiling {
        return Some(EncodedImage {
            format: ImageEncoding::Png,
            data: png,
            pixel_width,
            pixel_height,
        });
    }

    // Oversized or failed lossless output falls back to quality-bounded JPEG.
    let mut jpeg = Vec::new();
    let encoded = JpegEncoder::new_with_quality(&mut jpeg, options.jpeg_quality).encode(
        rgb.as_raw(),
        pixel_width,
        pixel_height,
        ColorType::Rgb8.into(),
    );
    match encoded {
        Ok(()) => Some(EncodedImage {
            format: ImageEncoding::Jpeg,
            data: jpeg,
            pixel_width,
            pixel_height,
        }),
        Err(err) => {
            log::warn!("image encode failed, block will be omitted: {err}");
            None
        }
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let mut img = RgbaImage::new(width, height);
        for px in img.pixels_mut() {
            *px = pixel;
        }
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, ColorType::Rgba8.into())
            .expect("encode fixture");
        out
    }

    fn box_mm(w: f32, h: f32) -> (Mm, Mm) {
        (Mm::from_f32(w), Mm::from_f32(h))
    }

    #[test]
    fn oversized_source_fits_the_box_and_keeps_aspect() {
        let bytes = png_bytes(400, 300, Rgba([10, 20, 30, 255]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let pre = preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
        assert!(pre.width <= max_w && pre.height <= max_h);
        let ratio = pre.width.to_f32() / pre.height.to_f32();
        assert!((ratio - 4.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn tall_source_clamps_on_height() {
        let bytes = png_bytes(200, 800, Rgba([0, 0, 0, 255]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let pre = preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
        assert!((pre.height.to_f32() - 90.0).abs() < 1e-3);
        assert!((pre.width.to_f32() - 22.5).abs() < 1e-3);
    }

    #[test]
    fn small_source_is_never_upscaled_logically() {
        let bytes = png_bytes(60, 40, Rgba([255, 0, 0, 255]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let pre = preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
        assert!((pre.width.to_f32() - 60.0).abs() < 1e-3);
        assert!((pre.height.to_f32() - 40.0).abs() < 1e-3);
    }

    #[test]
    fn supersampling_stays_between_two_and_four_x() {
        for (w, h) in [(60u32, 40u32), (400, 300), (200, 800)] {
            let bytes = png_bytes(w, h, Rgba([1, 2, 3, 255]));
            let (max_w, max_h) = box_mm(120.0, 90.0);
            let pre =
                preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
            let factor = pre.image.pixel_width as f32 / pre.width.to_f32();
            assert!((2.0 - 0.01..=4.0 + 0.01).contains(&factor), "factor {factor}");
        }
    }

    #[test]
    fn lossless_encoding_preferred_under_ceiling() {
        let bytes = png_bytes(100, 100, Rgba([5, 5, 5, 255]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let pre = preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
        assert_eq!(pre.image.format, ImageEncoding::Png);
    }

    #[test]
    fn oversized_lossless_output_falls_back_to_jpeg() {
        let bytes = png_bytes(100, 100, Rgba([5, 5, 5, 255]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let options = RasterOptions {
            lossless_byte_ceiling: 64,
            ..RasterOptions::default()
        };
        let pre = preprocess(&bytes, max_w, max_h, &options).expect("preprocess");
        assert_eq!(pre.image.format, ImageEncoding::Jpeg);
    }

    #[test]
    fn transparency_is_flattened_onto_white() {
        let bytes = png_bytes(50, 50, Rgba([0, 0, 0, 0]));
        let (max_w, max_h) = box_mm(120.0, 90.0);
        let pre = preprocess(&bytes, max_w, max_h, &RasterOptions::default()).expect("preprocess");
        let decoded = image::load_from_memory(&pre.image.data)
            .expect("decode output")
            .to_rgb8();
        let px = decoded.get_pixel(10, 10);
        assert_eq!((px[0], px[1], px[2]), (255, 255, 255));
    }

    #[test]
    fn undecodable_bytes_yield_none() {
        let (max_w, max_h) = box_mm(120.0, 90.0);
        assert!(preprocess(b"not an image", max_w, max_h, &RasterOptions::default()).is_none());
    }

    #[test]
    fn data_uri_parsing() {
        use base64::Engine as _;
        let payload = base64::engine::general_purpose::STANDARD.encode(b"pixels");
        let (mime, data) =
            parse_data_uri(&format!("data:image/png;base64,{payload}")).expect("parse");
        assert_eq!(mime, "image/png");
        assert_eq!(data, b"pixels");
        assert!(parse_data_uri("https://example.com/a.png").is_none());
    }
}
