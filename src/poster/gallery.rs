use crate::cancel::CancellationToken;
use crate::config::PosterConfig;
use crate::poster::backend::VideoBackend;
use crate::poster::{generate_poster, PosterImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum PosterSlot {
    Loading,
    Ready(Arc<PosterImage>),
    /// the view shows its fallback icon
    Failed(String),
}

#[derive(Debug, Default)]
struct BoardState {
    detail: Option<(String, PosterSlot)>,
    thumbnails: HashMap<String, PosterSlot>,
    detail_token: CancellationToken,
    thumbnail_token: CancellationToken,
}

/// Poster state for a media viewer: one large "currently displayed" poster
/// and a strip of sibling thumbnails. Each of the two views owns a
/// cancellation token; changing its input or unmounting cancels the token and
/// late results of the old requests are discarded.
///
/// Tokens live under the same lock as the slots, so a result is checked and
/// written in one critical section.
#[derive(Clone)]
pub struct PosterBoard {
    backend: Arc<dyn VideoBackend>,
    config: PosterConfig,
    state: Arc<Mutex<BoardState>>,
}

impl PosterBoard {
    pub fn new(backend: Arc<dyn VideoBackend>, config: PosterConfig) -> Self {
        PosterBoard {
            backend,
            config,
            state: Arc::new(Mutex::new(BoardState::default())),
        }
    }

    fn update_state<F: FnOnce(&mut BoardState)>(&self, f: F) {
        if let Ok(mut lock) = self.state.lock() {
            f(&mut lock);
        }
    }

    /// Run `f` only if `token` is still live when the lock is held.
    /// Returns false when the result was discarded.
    fn commit<F: FnOnce(&mut BoardState)>(&self, token: &CancellationToken, f: F) -> bool {
        match self.state.lock() {
            Ok(mut lock) => match token.deliver(f) {
                Some(f) => {
                    f(&mut lock);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Display `url` in the detail view and generate its poster.
    pub async fn show_detail(&self, url: &str) {
        let token = CancellationToken::new();
        self.update_state(|s| {
            s.detail_token.cancel();
            s.detail_token = token.clone();
            s.detail = Some((url.to_string(), PosterSlot::Loading));
        });

        let result = generate_poster(
            self.backend.as_ref(),
            url,
            self.config.at_seconds,
            self.config.detail_width,
        )
        .await;

        let slot = slot_from(result);
        if !self.commit(&token, |s| s.detail = Some((url.to_string(), slot))) {
            tracing::debug!("poster: discarding detail result for {}", url);
        }
    }

    /// Replace the sibling strip with `urls` (at most `max_siblings`) and
    /// generate their thumbnails concurrently.
    pub async fn show_thumbnails(&self, urls: &[String]) {
        let token = CancellationToken::new();
        let urls: Vec<String> = urls.iter().take(self.config.max_siblings).cloned().collect();
        self.update_state(|s| {
            s.thumbnail_token.cancel();
            s.thumbnail_token = token.clone();
            s.thumbnails = urls
                .iter()
                .map(|u| (u.clone(), PosterSlot::Loading))
                .collect();
        });

        let jobs = urls.iter().map(|url| {
            let token = token.clone();
            async move {
                let result = generate_poster(
                    self.backend.as_ref(),
                    url,
                    self.config.at_seconds,
                    self.config.thumbnail_width,
                )
                .await;
                let slot = slot_from(result);
                let written = self.commit(&token, |s| {
                    s.thumbnails.insert(url.clone(), slot);
                });
                if !written {
                    tracing::debug!("poster: discarding thumbnail result for {}", url);
                }
            }
        });
        futures::future::join_all(jobs).await;
    }

    /// The owning view went away; nothing in flight may write anymore.
    pub fn unmount(&self) {
        self.update_state(|s| {
            s.detail_token.cancel();
            s.thumbnail_token.cancel();
        });
    }

    pub fn detail(&self) -> Option<(String, PosterSlot)> {
        self.state.lock().ok().and_then(|s| s.detail.clone())
    }

    pub fn thumbnail(&self, url: &str) -> Option<PosterSlot> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.thumbnails.get(url).cloned())
    }

    pub fn thumbnail_count(&self) -> usize {
        self.state.lock().map(|s| s.thumbnails.len()).unwrap_or(0)
    }
}

fn slot_from(result: Result<PosterImage, crate::poster::PosterError>) -> PosterSlot {
    match result {
        Ok(image) => PosterSlot::Ready(Arc::new(image)),
        Err(e) => PosterSlot::Failed(e.to_string()),
    }
}
