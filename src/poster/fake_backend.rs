//! Scripted in-memory video backend for poster tests.
use crate::poster::backend::{
    LoadRequest, ReadyState, SeekRejected, VideoBackend, VideoMetadata, VideoSession,
};
use crate::poster::PosterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
pub struct FakeVideo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fail_load: bool,
    pub fail_metadata: bool,
    /// first `set_current_time` is refused until loaded data arrives
    pub reject_early_seek: bool,
    /// every `set_current_time` is refused
    pub refuse_seek: bool,
    /// `seeked` signals `reached` and then waits for `release`
    pub seek_gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeVideo {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        FakeVideo {
            duration,
            width,
            height,
            fail_load: false,
            fail_metadata: false,
            reject_early_seek: false,
            refuse_seek: false,
            seek_gate: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeLog {
    pub requests: Vec<LoadRequest>,
    pub seeks: Vec<f64>,
    pub loaded_data_waits: usize,
    pub released: usize,
}

#[derive(Default)]
pub struct FakeBackend {
    videos: HashMap<String, FakeVideo>,
    pub log: Arc<Mutex<FakeLog>>,
}

impl FakeBackend {
    pub fn with(mut self, url: &str, video: FakeVideo) -> Self {
        self.videos.insert(url.to_string(), video);
        self
    }

    pub fn released(&self) -> usize {
        self.log.lock().unwrap().released
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.log.lock().unwrap().seeks.clone()
    }
}

fn strip_cache_buster(url: &str) -> &str {
    match url.rfind("t=") {
        Some(pos) if pos > 0 => &url[..pos - 1],
        _ => url,
    }
}

impl VideoBackend for FakeBackend {
    fn open(&self, request: &LoadRequest) -> Result<Box<dyn VideoSession>, PosterError> {
        self.log.lock().unwrap().requests.push(request.clone());
        let key = strip_cache_buster(&request.url);
        let video = self
            .videos
            .get(key)
            .cloned()
            .ok_or_else(|| PosterError::Load(format!("404 {}", key)))?;
        if video.fail_load {
            return Err(PosterError::Load(format!("network error for {}", key)));
        }
        Ok(Box::new(FakeSession {
            video,
            ready: ReadyState::HaveNothing,
            position: None,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    video: FakeVideo,
    ready: ReadyState,
    position: Option<f64>,
    log: Arc<Mutex<FakeLog>>,
}

#[async_trait]
impl VideoSession for FakeSession {
    async fn metadata(&mut self) -> Result<VideoMetadata, PosterError> {
        tokio::task::yield_now().await;
        if self.video.fail_metadata {
            return Err(PosterError::Metadata("decode error".to_string()));
        }
        self.ready = ReadyState::HaveMetadata;
        Ok(VideoMetadata {
            duration: self.video.duration,
            width: self.video.width,
            height: self.video.height,
        })
    }

    fn ready_state(&self) -> ReadyState {
        self.ready
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), SeekRejected> {
        if self.video.refuse_seek
            || (self.video.reject_early_seek && self.ready < ReadyState::HaveCurrentData)
        {
            return Err(SeekRejected(seconds));
        }
        self.log.lock().unwrap().seeks.push(seconds);
        self.position = Some(seconds);
        Ok(())
    }

    async fn loaded_data(&mut self) -> Result<(), PosterError> {
        tokio::task::yield_now().await;
        self.log.lock().unwrap().loaded_data_waits += 1;
        self.ready = ReadyState::HaveCurrentData;
        Ok(())
    }

    async fn seeked(&mut self) -> Result<(), PosterError> {
        if let Some((reached, release)) = &self.video.seek_gate {
            reached.notify_one();
            release.notified().await;
        }
        if self.position.is_none() {
            return Err(PosterError::Seek("no seek pending".to_string()));
        }
        self.ready = ReadyState::HaveEnoughData;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<image::RgbaImage, PosterError> {
        if self.ready < ReadyState::HaveCurrentData {
            return Err(PosterError::Capture("no frame decoded".to_string()));
        }
        Ok(image::RgbaImage::from_pixel(
            self.video.width,
            self.video.height,
            image::Rgba([90, 120, 30, 255]),
        ))
    }

    fn release(&mut self) {
        self.position = None;
        self.ready = ReadyState::HaveNothing;
        self.log.lock().unwrap().released += 1;
    }
}
