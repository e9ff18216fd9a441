//! Poster frames decoded with FFmpeg. Enabled by the `ffmpeg` cargo feature.
//!
//! Demuxing and decoding block, so every FFmpeg call runs on the blocking
//! pool. The demuxer moves into the blocking task and comes back with the
//! result.
use crate::poster::backend::{
    LoadRequest, ReadyState, SeekRejected, VideoBackend, VideoMetadata, VideoSession,
};
use crate::poster::PosterError;
use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use std::sync::Once;

static INIT: Once = Once::new();

fn init_ffmpeg() {
    INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            tracing::warn!("ffmpeg: init failed: {}", e);
        }
    });
}

/// Opens each poster request as its own FFmpeg demuxer/decoder pair.
#[derive(Debug, Default)]
pub struct FfmpegBackend;

impl VideoBackend for FfmpegBackend {
    /// Only records the source; the input is opened when metadata is requested.
    fn open(&self, request: &LoadRequest) -> Result<Box<dyn VideoSession>, PosterError> {
        Ok(Box::new(FfmpegSession {
            url: request.url.clone(),
            demuxer: None,
            target: None,
            frame: None,
            ready: ReadyState::HaveNothing,
        }))
    }
}

struct Demuxer {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    /// seconds per pts tick of the video stream
    time_base: f64,
}

impl Demuxer {
    fn open(url: &str) -> Result<(Demuxer, VideoMetadata), PosterError> {
        init_ffmpeg();
        let input = ffmpeg::format::input(&url)
            .map_err(|e| PosterError::Load(format!("{}: {}", url, e)))?;
        tracing::debug!("ffmpeg: opened {}", url);

        let (stream_index, time_base, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| PosterError::Metadata("no video stream".to_string()))?;
            (stream.index(), f64::from(stream.time_base()), stream.parameters())
        };
        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| PosterError::Metadata(e.to_string()))?;

        let duration = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            f64::NAN
        };
        let meta = VideoMetadata {
            duration,
            width: decoder.width(),
            height: decoder.height(),
        };
        Ok((
            Demuxer {
                input,
                decoder,
                stream_index,
                time_base,
            },
            meta,
        ))
    }

    fn decode_at(&mut self, target: f64) -> Result<image::RgbaImage, PosterError> {
        let ts = (target * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(ts, ..ts)
            .map_err(|e| PosterError::Seek(format!("{:.2}s: {}", target, e)))?;
        self.decoder.flush();

        let mut scaler = ffmpeg::software::scaling::context::Context::get(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            ffmpeg::format::Pixel::RGBA,
            self.decoder.width(),
            self.decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| PosterError::Capture(e.to_string()))?;

        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        let mut fallback: Option<ffmpeg::util::frame::video::Video> = None;
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.pts().unwrap_or(0) as f64 * self.time_base;
                if pts + 0.001 >= target {
                    return frame_to_rgba(&mut scaler, &decoded);
                }
                fallback = Some(decoded.clone());
            }
        }

        // Past the last packet: use the last frame decoded before the target.
        match fallback {
            Some(frame) => frame_to_rgba(&mut scaler, &frame),
            None => Err(PosterError::Capture(format!("no frame at {:.2}s", target))),
        }
    }
}

fn frame_to_rgba(
    scaler: &mut ffmpeg::software::scaling::context::Context,
    frame: &ffmpeg::util::frame::video::Video,
) -> Result<image::RgbaImage, PosterError> {
    let mut rgba = ffmpeg::util::frame::video::Video::empty();
    scaler
        .run(frame, &mut rgba)
        .map_err(|e| PosterError::Capture(e.to_string()))?;

    let (width, height) = (rgba.width(), rgba.height());
    let stride = rgba.stride(0);
    let row_bytes = width as usize * 4;
    let data = rgba.data(0);
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| PosterError::Capture("frame buffer size mismatch".to_string()))
}

struct FfmpegSession {
    url: String,
    demuxer: Option<Demuxer>,
    target: Option<f64>,
    frame: Option<image::RgbaImage>,
    ready: ReadyState,
}

#[async_trait]
impl VideoSession for FfmpegSession {
    async fn metadata(&mut self) -> Result<VideoMetadata, PosterError> {
        let url = self.url.clone();
        let (demuxer, meta) = tokio::task::spawn_blocking(move || Demuxer::open(&url))
            .await
            .map_err(|e| PosterError::Load(format!("spawn_blocking for open: {}", e)))??;
        self.demuxer = Some(demuxer);
        self.ready = ReadyState::HaveMetadata;
        Ok(meta)
    }

    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), SeekRejected> {
        if self.ready < ReadyState::HaveMetadata {
            return Err(SeekRejected(seconds));
        }
        self.target = Some(seconds);
        Ok(())
    }

    async fn loaded_data(&mut self) -> Result<(), PosterError> {
        if self.demuxer.is_none() {
            return Err(PosterError::Load("metadata never loaded".to_string()));
        }
        self.ready = ReadyState::HaveCurrentData;
        Ok(())
    }

    async fn seeked(&mut self) -> Result<(), PosterError> {
        let target = self
            .target
            .ok_or_else(|| PosterError::Seek("no seek pending".to_string()))?;
        let mut demuxer = self
            .demuxer
            .take()
            .ok_or_else(|| PosterError::Seek("source detached".to_string()))?;
        let (demuxer, frame) = tokio::task::spawn_blocking(move || {
            let frame = demuxer.decode_at(target);
            (demuxer, frame)
        })
        .await
        .map_err(|e| PosterError::Capture(format!("spawn_blocking for decode: {}", e)))?;
        self.demuxer = Some(demuxer);
        self.frame = Some(frame?);
        self.ready = ReadyState::HaveEnoughData;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<image::RgbaImage, PosterError> {
        self.frame
            .take()
            .ok_or_else(|| PosterError::Capture("no frame decoded".to_string()))
    }

    fn release(&mut self) {
        self.frame = None;
        self.target = None;
        self.demuxer = None;
        self.ready = ReadyState::HaveNothing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send + 'static>() {}

    #[test]
    fn test_session_state_moves_across_threads() {
        // WHY: the demuxer is handed to spawn_blocking and back, which needs
        // Send from the ffmpeg-next types themselves
        assert_send::<Demuxer>();
        assert_send::<FfmpegSession>();
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_as_load_error() {
        let request = LoadRequest::for_poster("/nonexistent/clip.mp4", 0);
        let mut session = FfmpegBackend.open(&request).expect("open only records the url");
        let err = session.metadata().await.unwrap_err();
        assert!(matches!(err, PosterError::Load(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_seek_without_metadata_is_rejected() {
        let request = LoadRequest::for_poster("/nonexistent/clip.mp4", 0);
        let mut session = FfmpegBackend.open(&request).expect("open only records the url");
        assert_eq!(session.set_current_time(1.0), Err(SeekRejected(1.0)));
        assert!(session.seeked().await.is_err());
    }
}
