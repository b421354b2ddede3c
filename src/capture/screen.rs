// screen.rs — Captures one display via xcap and encodes frames for upload.
// Display selection is deterministic: primary first, then the top-left-most.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView};

use super::{CaptureError, CaptureProvider, CapturedImage};

// ── Display selection ───────────────────────────────────────────────────
/// What selection needs to know about a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Pick the display to capture, as an index into `displays`.
///
/// The primary display wins. Without one, the display with the smallest
/// origin (top-most, then left-most) wins and ties go to the lowest id, so
/// the choice never depends on enumeration order.
pub fn select_display(displays: &[DisplayInfo]) -> Option<usize> {
    if let Some(idx) = displays.iter().position(|d| d.is_primary) {
        return Some(idx);
    }
    displays
        .iter()
        .enumerate()
        .filter(|(_, d)| d.width > 0 && d.height > 0)
        .min_by_key(|(_, d)| (d.y, d.x, d.id))
        .map(|(idx, _)| idx)
}

// ── XcapCapture ─────────────────────────────────────────────────────────
/// Screen capture through `xcap`. Stateless: monitors are enumerated on
/// every call so hot-plugged displays are picked up.
#[derive(Default)]
pub struct XcapCapture;

impl XcapCapture {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureProvider for XcapCapture {
    fn capture_primary_display(&self) -> Result<CapturedImage, CaptureError> {
        let monitors =
            xcap::Monitor::all().map_err(|e| CaptureError::Enumerate(e.to_string()))?;

        let infos: Vec<DisplayInfo> = monitors
            .iter()
            .map(|m| DisplayInfo {
                id: m.id(),
                x: m.x(),
                y: m.y(),
                width: m.width(),
                height: m.height(),
                is_primary: m.is_primary(),
            })
            .collect();

        let idx = select_display(&infos).ok_or(CaptureError::NoDisplay)?;
        let chosen = &infos[idx];
        log::info!(
            "Using display {} ({}x{} at {},{}{})",
            chosen.id,
            chosen.width,
            chosen.height,
            chosen.x,
            chosen.y,
            if chosen.is_primary { ", primary" } else { "" }
        );

        let raw = monitors[idx]
            .capture_image()
            .map_err(|e| CaptureError::Capture(e.to_string()))?;

        // `xcap` returns an `image::RgbaImage`; the frame is kept as RGB.
        let img = DynamicImage::ImageRgba8(raw);
        log::info!("Screenshot captured ({}x{})", img.width(), img.height());
        Ok(CapturedImage::from(img))
    }

    fn name(&self) -> &str {
        "xcap"
    }
}

// ── Encoding ────────────────────────────────────────────────────────────

/// Downscale if wider than `max_width` (0 = keep size), JPEG-encode, then
/// base64-encode.
pub fn encode_jpeg_base64(
    img: DynamicImage,
    max_width: u32,
    jpeg_quality: u8,
) -> Result<String, image::ImageError> {
    let img = if max_width > 0 && img.width() > max_width {
        let ratio = max_width as f64 / img.width() as f64;
        let new_h = ((img.height() as f64 * ratio).round() as u32).max(1);
        img.resize_exact(max_width, new_h, imageops::FilterType::Triangle)
    } else {
        img
    };

    let (w, h) = img.dimensions();

    let mut jpeg_buf: Vec<u8> = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buf, jpeg_quality);
        encoder.encode(img.to_rgb8().as_raw(), w, h, image::ExtendedColorType::Rgb8)?;
    }

    Ok(BASE64.encode(&jpeg_buf))
}

// ── Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use image::RgbImage;

    fn display(id: u32, x: i32, y: i32, is_primary: bool) -> DisplayInfo {
        DisplayInfo {
            id,
            x,
            y,
            width: 1920,
            height: 1080,
            is_primary,
        }
    }

    /// Helper: create a solid-colour RGB image.
    fn solid_image(r: u8, g: u8, b: u8, w: u32, h: u32) -> DynamicImage {
        let mut img = RgbImage::new(w, h);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([r, g, b]);
        }
        DynamicImage::ImageRgb8(img)
    }

    fn decode(b64: &str) -> DynamicImage {
        let bytes = BASE64.decode(b64).expect("valid base64");
        image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg).expect("valid jpeg")
    }

    #[test]
    fn primary_display_wins() {
        let displays = vec![display(1, 0, 0, false), display(2, 1920, 0, true)];
        assert_eq!(select_display(&displays), Some(1));
    }

    #[test]
    fn top_left_display_wins_without_primary() {
        let displays = vec![
            display(3, 1920, 0, false),
            display(2, -1920, 200, false),
            display(7, 0, 0, false),
        ];
        assert_eq!(select_display(&displays), Some(2));
    }

    #[test]
    fn selection_ignores_enumeration_order() {
        let a = vec![display(5, 0, 0, false), display(4, 0, 0, false)];
        let b = vec![display(4, 0, 0, false), display(5, 0, 0, false)];
        assert_eq!(a[select_display(&a).unwrap()].id, 4);
        assert_eq!(b[select_display(&b).unwrap()].id, 4);
    }

    #[test]
    fn no_displays_selects_nothing() {
        assert_eq!(select_display(&[]), None);
    }

    #[test]
    fn wide_images_are_downscaled() {
        let img = solid_image(10, 20, 30, 400, 200);
        let decoded = decode(&encode_jpeg_base64(img, 100, 80).unwrap());
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let img = solid_image(200, 200, 200, 64, 48);
        let decoded = decode(&encode_jpeg_base64(img.clone(), 1024, 80).unwrap());
        assert_eq!(decoded.dimensions(), (64, 48));

        let decoded = decode(&encode_jpeg_base64(img, 0, 80).unwrap());
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn captured_image_drops_alpha() {
        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([1, 2, 3, 0]));
        rgba.put_pixel(1, 0, image::Rgba([4, 5, 6, 255]));
        let captured = CapturedImage::from(DynamicImage::ImageRgba8(rgba));
        assert_eq!(captured.width(), 2);
        assert_eq!(captured.height(), 1);
        assert_eq!(captured.as_raw(), &[1, 2, 3, 4, 5, 6]);
    }
}
