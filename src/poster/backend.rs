use crate::poster::PosterError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossOrigin {
    Anonymous,
    UseCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preload {
    None,
    Metadata,
    Auto,
}

/// How a poster session asks the backend to load a video.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub url: String,
    pub cross_origin: CrossOrigin,
    pub muted: bool,
    pub preload: Preload,
}

impl LoadRequest {
    /// Off-screen, muted, metadata-only load with credentials and a
    /// cache-defeating `t` query parameter.
    pub fn for_poster(url: &str, stamp_millis: i64) -> Self {
        LoadRequest {
            url: cache_busted_url(url, stamp_millis),
            cross_origin: CrossOrigin::UseCredentials,
            muted: true,
            preload: Preload::Metadata,
        }
    }
}

/// Append `t=<stamp>` to the query string, keeping any fragment last.
pub fn cache_busted_url(url: &str, stamp_millis: i64) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let sep = if base.contains('?') { '&' } else { '?' };
    let mut out = format!("{}{}t={}", base, sep, stamp_millis);
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// seconds; may be NaN or infinite for live or broken streams
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Media element readiness, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("cannot seek to {0:.2}s at the current ready state")]
pub struct SeekRejected(pub f64);

/// One loaded video, driven through load -> metadata -> seek -> capture.
#[async_trait]
pub trait VideoSession: Send {
    /// Resolves once duration and natural size are known.
    async fn metadata(&mut self) -> Result<VideoMetadata, PosterError>;

    fn ready_state(&self) -> ReadyState;

    fn set_current_time(&mut self, seconds: f64) -> Result<(), SeekRejected>;

    /// Resolves on the first `loadeddata`-equivalent event.
    async fn loaded_data(&mut self) -> Result<(), PosterError>;

    /// Resolves when the pending seek has completed.
    async fn seeked(&mut self) -> Result<(), PosterError>;

    /// The frame at the current position, natural size.
    fn capture_frame(&mut self) -> Result<image::RgbaImage, PosterError>;

    /// Pause, detach the source and reload so the decoder is freed.
    fn release(&mut self);
}

pub trait VideoBackend: Send + Sync {
    fn open(&self, request: &LoadRequest) -> Result<Box<dyn VideoSession>, PosterError>;
}
