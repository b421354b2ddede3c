/// The `capture` module produces one still image of a display per request.
/// `screen` holds the xcap-backed provider plus the display-selection and
/// encoding helpers.
pub mod screen;

pub use screen::{select_display, DisplayInfo, XcapCapture};

use image::{DynamicImage, RgbImage};

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No display available to capture")]
    NoDisplay,
    #[error("Failed to enumerate displays: {0}")]
    Enumerate(String),
    #[error("Capture failed: {0}")]
    Capture(String),
    #[error("Capture worker failed: {0}")]
    Worker(String),
}

/// Source of screenshots. Calls block; the gate runs them on the blocking pool.
pub trait CaptureProvider: Send + Sync {
    fn capture_primary_display(&self) -> Result<CapturedImage, CaptureError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}

/// One captured frame: RGB8, row-major, no alpha.
///
/// Owned by the processing task that asked for it and dropped once the
/// provider has answered.
pub struct CapturedImage {
    pixels: RgbImage,
}

impl CapturedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw RGB bytes, three per pixel.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Downscale (if wider than `max_width`, 0 = never), JPEG-encode and
    /// base64-encode for upload.
    pub fn to_jpeg_base64(&self, max_width: u32, quality: u8) -> Result<String, image::ImageError> {
        screen::encode_jpeg_base64(
            DynamicImage::ImageRgb8(self.pixels.clone()),
            max_width,
            quality,
        )
    }
}

impl From<DynamicImage> for CapturedImage {
    fn from(img: DynamicImage) -> Self {
        Self::new(img.to_rgb8())
    }
}
