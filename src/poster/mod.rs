pub mod backend;
#[cfg(test)]
pub mod fake_backend;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod gallery;

use backend::{LoadRequest, ReadyState, VideoBackend, VideoSession};

/// Assumed length of clips that report no usable duration.
const NOMINAL_DURATION_SECS: f64 = 1.0;
/// Distance kept from both ends of the clip.
const EDGE_MARGIN_SECS: f64 = 0.1;
const MIN_UPPER_BOUND_SECS: f64 = 0.5;
const POSTER_JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum PosterError {
    #[error("failed to load video: {0}")]
    Load(String),
    #[error("video metadata unavailable: {0}")]
    Metadata(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("poster encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A rasterized, JPEG-encoded poster frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PosterImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl PosterImage {
    pub fn mime(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Releases the session on every exit path, including cancellation by drop.
struct SessionGuard {
    session: Box<dyn VideoSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.release();
    }
}

pub fn effective_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        NOMINAL_DURATION_SECS
    }
}

/// Keep the seek target away from the black first frame and the empty tail.
pub fn clamp_seek_target(at_seconds: f64, duration: f64) -> f64 {
    let upper = (effective_duration(duration) - EDGE_MARGIN_SECS).max(MIN_UPPER_BOUND_SECS);
    if at_seconds.is_nan() {
        return EDGE_MARGIN_SECS;
    }
    at_seconds.clamp(EDGE_MARGIN_SECS, upper)
}

/// Output size with the source aspect ratio, never wider than `max_width`
/// and never upscaled.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let max_width = max_width.max(1);
    if width == 0 || height == 0 {
        return (width.min(max_width), height);
    }
    if width <= max_width {
        return (width, height);
    }
    let scaled_height = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled_height.max(1))
}

/// Load `video_url` off-screen, seek near `at_seconds` and return a JPEG of
/// that frame at most `max_width_px` wide. The session is released whether
/// this succeeds, fails, or the future is dropped.
pub async fn generate_poster(
    backend: &dyn VideoBackend,
    video_url: &str,
    at_seconds: f64,
    max_width_px: u32,
) -> Result<PosterImage, PosterError> {
    let request = LoadRequest::for_poster(video_url, chrono::Utc::now().timestamp_millis());
    let session = backend.open(&request)?;
    let mut guard = SessionGuard { session };
    let result = capture_poster(guard.session.as_mut(), at_seconds, max_width_px).await;
    match &result {
        Ok(p) => tracing::debug!("poster: {} -> {}x{}", video_url, p.width, p.height),
        Err(e) => tracing::warn!("poster: {} failed: {}", video_url, e),
    }
    result
}

async fn capture_poster(
    session: &mut dyn VideoSession,
    at_seconds: f64,
    max_width_px: u32,
) -> Result<PosterImage, PosterError> {
    let meta = session.metadata().await?;
    let target = clamp_seek_target(at_seconds, meta.duration);

    if let Err(rejected) = session.set_current_time(target) {
        tracing::debug!(
            "poster: {} (ready state {:?}), waiting for loaded data",
            rejected,
            session.ready_state()
        );
        if session.ready_state() < ReadyState::HaveCurrentData {
            session.loaded_data().await?;
        }
        session
            .set_current_time(target)
            .map_err(|e| PosterError::Seek(e.to_string()))?;
    }
    session.seeked().await?;

    let frame = session.capture_frame()?;
    let (natural_w, natural_h) = if meta.width > 0 && meta.height > 0 {
        (meta.width, meta.height)
    } else {
        (frame.width(), frame.height())
    };
    let (w, h) = scaled_dimensions(natural_w, natural_h, max_width_px);
    if w == 0 || h == 0 {
        return Err(PosterError::Capture("video has no visible frame".to_string()));
    }
    encode_frame(frame, w, h)
}

fn encode_frame(frame: image::RgbaImage, width: u32, height: u32) -> Result<PosterImage, PosterError> {
    let frame = image::DynamicImage::ImageRgba8(frame);
    let scaled = if frame.width() == width && frame.height() == height {
        frame
    } else {
        frame.resize_exact(width, height, image::imageops::FilterType::Triangle)
    };
    let mut bytes = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, POSTER_JPEG_QUALITY);
    image::DynamicImage::ImageRgb8(scaled.to_rgb8()).write_with_encoder(encoder)?;
    Ok(PosterImage {
        width,
        height,
        bytes,
    })
}
