use crate::config::IntakeConfig;
use crate::intake::exif;
use crate::intake::preview::PreviewAdapter;
use crate::intake::transcode::ImageTranscoder;
use crate::intake::validator::{self, AddMode, RejectionSummary};
use crate::media::model::{
    AssetId, GpsCoordinate, MediaAsset, MediaFile, MediaKind, PreviewImage, PreviewRecord,
    PreviewState,
};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntakeError {
    #[error("no valid files selected: {summary}")]
    NoValidFiles { summary: RejectionSummary },
    #[error("upload queue already holds the maximum of {max_files} files")]
    CapacityExceeded { max_files: usize },
}

/// Identifies one scheduled conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

#[derive(Debug)]
pub enum PatchUpdate {
    ConversionStarted,
    ConversionFinished(PreviewRecord),
}

/// Message a background conversion sends back to the queue.
#[derive(Debug)]
pub struct PreviewPatch {
    pub request_id: RequestId,
    pub asset_id: AssetId,
    pub update: PatchUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOutcome {
    /// ids of the newly accepted assets, in selection order
    pub accepted: Vec<AssetId>,
    pub rejections: RejectionSummary,
    pub gps: Option<GpsCoordinate>,
}

/// Borrowed view of one queue position.
#[derive(Debug, Clone, Copy)]
pub struct QueueItem<'a> {
    pub asset: &'a MediaAsset,
    pub preview: &'a PreviewRecord,
}

pub type GpsCallback = Box<dyn FnMut(GpsCoordinate) + Send>;

struct QueueEntry {
    asset: MediaAsset,
    preview: PreviewRecord,
}

/// Ordered, bounded collection of accepted files and their previews.
///
/// Entries are stored by `AssetId`; the `order` vector is the only place
/// positions exist. Background conversions report through a channel and every
/// patch is re-checked against the identity map before it is applied, so a
/// conversion for a removed asset is dropped instead of landing in whatever
/// now occupies its old index.
pub struct UploadQueue {
    config: IntakeConfig,
    adapter: PreviewAdapter,
    entries: HashMap<AssetId, QueueEntry>,
    order: Vec<AssetId>,
    next_asset: u64,
    next_request: u64,
    in_flight: HashSet<RequestId>,
    patch_tx: mpsc::UnboundedSender<PreviewPatch>,
    patch_rx: mpsc::UnboundedReceiver<PreviewPatch>,
    on_gps_found: Option<GpsCallback>,
}

impl UploadQueue {
    pub fn new(config: IntakeConfig, transcoder: Arc<dyn ImageTranscoder>) -> Self {
        let (patch_tx, patch_rx) = mpsc::unbounded_channel();
        let adapter = PreviewAdapter::new(transcoder, config.conversion_quality);
        UploadQueue {
            config,
            adapter,
            entries: HashMap::new(),
            order: Vec::new(),
            next_asset: 1,
            next_request: 1,
            in_flight: HashSet::new(),
            patch_tx,
            patch_rx,
            on_gps_found: None,
        }
    }

    /// Install the callback that receives the GPS suggestion of an `add_files` call.
    pub fn on_gps_found<F>(&mut self, callback: F)
    where
        F: FnMut(GpsCoordinate) + Send + 'static,
    {
        self.on_gps_found = Some(Box::new(callback));
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= self.config.max_files
    }

    /// Conversions scheduled but not yet reported back.
    pub fn in_flight_conversions(&self) -> usize {
        self.in_flight.len()
    }

    /// Validate a selection, seed previews in selection order, schedule
    /// conversions and look for a GPS position among the new images.
    ///
    /// Must run inside a tokio runtime; conversions are spawned onto it.
    pub async fn add_files(
        &mut self,
        selection: Vec<MediaFile>,
        mode: AddMode,
    ) -> Result<AddOutcome, IntakeError> {
        let selected = selection.len();
        let available = validator::available_capacity(self.config.max_files, self.len(), mode);
        let report = validator::classify_batch(selection, &self.config, available);
        let rejections = RejectionSummary::from_rejections(&report.rejected);

        if report.accepted.is_empty() {
            tracing::info!(
                "intake: none of {} selected file(s) accepted ({})",
                selected,
                rejections
            );
            return Err(IntakeError::NoValidFiles {
                summary: rejections,
            });
        }

        if mode == AddMode::Replace {
            self.clear();
        }

        // Seed every slot before anything asynchronous runs.
        let mut accepted = Vec::with_capacity(report.accepted.len());
        let mut pending = Vec::new();
        for (file, verdict) in report.accepted {
            let id = AssetId(self.next_asset);
            self.next_asset += 1;
            let asset = MediaAsset {
                id,
                file,
                kind: verdict.kind,
                needs_conversion: verdict.needs_conversion,
            };
            let built = self.adapter.build_preview(&asset);
            if let Some(fut) = built.pending {
                pending.push((id, fut));
            }
            self.entries.insert(
                id,
                QueueEntry {
                    asset,
                    preview: built.immediate,
                },
            );
            self.order.push(id);
            accepted.push(id);
        }

        tracing::info!(
            "intake: accepted {} of {} file(s), queue now {}/{}; {}",
            accepted.len(),
            selected,
            self.len(),
            self.config.max_files,
            rejections
        );

        for (asset_id, fut) in pending {
            self.schedule_conversion(asset_id, fut);
        }

        let images: Vec<MediaFile> = accepted
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.asset.kind == MediaKind::Image)
            .map(|e| e.asset.file.clone())
            .collect();
        let gps = first_gps(&images).await;
        if let Some(coord) = gps {
            if let Some(callback) = self.on_gps_found.as_mut() {
                callback(coord);
            }
        }

        Ok(AddOutcome {
            accepted,
            rejections,
            gps,
        })
    }

    fn schedule_conversion(
        &mut self,
        asset_id: AssetId,
        fut: futures::future::BoxFuture<'static, PreviewRecord>,
    ) {
        let request_id = RequestId(self.next_request);
        self.next_request += 1;
        self.in_flight.insert(request_id);
        let tx = self.patch_tx.clone();

        tokio::spawn(async move {
            let _ = tx.send(PreviewPatch {
                request_id,
                asset_id,
                update: PatchUpdate::ConversionStarted,
            });
            let record = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(record) => record,
                Err(_) => {
                    tracing::warn!("panic while converting {}", asset_id);
                    PreviewRecord::conversion_failed()
                }
            };
            let _ = tx.send(PreviewPatch {
                request_id,
                asset_id,
                update: PatchUpdate::ConversionFinished(record),
            });
        });
        tracing::debug!("intake: conversion {:?} scheduled for {}", request_id, asset_id);
    }

    /// The single reducer for background results. Returns true if the patch
    /// changed a preview; patches for assets no longer queued are dropped.
    pub fn apply_patch(&mut self, patch: PreviewPatch) -> bool {
        if matches!(patch.update, PatchUpdate::ConversionFinished(_)) {
            self.in_flight.remove(&patch.request_id);
        }
        let Some(entry) = self.entries.get_mut(&patch.asset_id) else {
            tracing::debug!(
                "intake: dropping {:?} for removed {}",
                patch.request_id,
                patch.asset_id
            );
            return false;
        };
        match patch.update {
            PatchUpdate::ConversionStarted => entry.preview.begin_conversion(),
            PatchUpdate::ConversionFinished(record) => {
                let state = record.state;
                let applied = entry.preview.finish_conversion(record);
                tracing::debug!("intake: {} -> {:?} (applied={})", patch.asset_id, state, applied);
                applied
            }
        }
    }

    /// Apply every patch already delivered, without waiting.
    pub fn drain_patches(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(patch) = self.patch_rx.try_recv() {
            if self.apply_patch(patch) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next patch and apply it. Returns None once no conversion
    /// is outstanding.
    pub async fn next_patch(&mut self) -> Option<AssetId> {
        if self.in_flight.is_empty() {
            self.drain_patches();
            return None;
        }
        let patch = self.patch_rx.recv().await?;
        let asset_id = patch.asset_id;
        self.apply_patch(patch);
        Some(asset_id)
    }

    /// Wait until every scheduled conversion has reported.
    pub async fn settle(&mut self) {
        while self.next_patch().await.is_some() {}
    }

    /// Remove the asset at `index`; later entries move down by one.
    pub fn remove_file(&mut self, index: usize) -> Option<MediaAsset> {
        if index >= self.order.len() {
            tracing::debug!("intake: remove_file({}) out of range", index);
            return None;
        }
        let id = self.order.remove(index);
        let entry = self.entries.remove(&id)?;
        tracing::info!("intake: removed {} ({:?})", id, entry.asset.file.name);
        Some(entry.asset)
    }

    pub fn clear(&mut self) {
        if !self.order.is_empty() {
            tracing::info!("intake: clearing {} queued file(s)", self.order.len());
        }
        self.order.clear();
        self.entries.clear();
    }

    /// Ok when a selection prompt may be opened.
    pub fn trigger_select(&self) -> Result<(), IntakeError> {
        if self.is_full() {
            return Err(IntakeError::CapacityExceeded {
                max_files: self.config.max_files,
            });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<QueueItem<'_>> {
        let id = self.order.get(index)?;
        self.entries.get(id).map(|e| QueueItem {
            asset: &e.asset,
            preview: &e.preview,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = QueueItem<'_>> {
        self.order.iter().filter_map(|id| {
            self.entries.get(id).map(|e| QueueItem {
                asset: &e.asset,
                preview: &e.preview,
            })
        })
    }

    pub fn position_of(&self, id: AssetId) -> Option<usize> {
        self.order.iter().position(|o| *o == id)
    }

    pub fn preview_of(&self, id: AssetId) -> Option<&PreviewRecord> {
        self.entries.get(&id).map(|e| &e.preview)
    }

    /// Files in the order the upload request must carry them.
    pub fn upload_files(&self) -> Vec<&MediaFile> {
        self.iter().map(|item| &item.asset.file).collect()
    }

    pub fn snapshot(&self) -> Vec<QueueSnapshotItem> {
        self.iter()
            .enumerate()
            .map(|(index, item)| QueueSnapshotItem {
                index,
                id: item.asset.id,
                name: item.asset.file.name.clone(),
                size: item.asset.file.size,
                kind: item.asset.kind,
                preview_state: item.preview.state,
                preview_mime: preview_mime(item.asset, item.preview),
            })
            .collect()
    }
}

/// First valid GPS position among `images`, scanned in order.
async fn first_gps(images: &[MediaFile]) -> Option<GpsCoordinate> {
    for file in images {
        if let Some(gps) = exif::extract_gps(file).await {
            tracing::info!(
                "intake: GPS ({:.6}, {:.6}) found in {:?}",
                gps.latitude(),
                gps.longitude(),
                file.name
            );
            return Some(gps);
        }
    }
    None
}

/// Serializable row describing one queue position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshotItem {
    pub index: usize,
    pub id: AssetId,
    pub name: String,
    pub size: u64,
    pub kind: MediaKind,
    pub preview_state: PreviewState,
    pub preview_mime: Option<String>,
}

fn preview_mime(asset: &MediaAsset, preview: &PreviewRecord) -> Option<String> {
    match &preview.image {
        PreviewImage::Original => asset.file.declared_mime.clone(),
        PreviewImage::Placeholder => Some("image/png".to_string()),
        PreviewImage::Encoded { format, .. } => Some(format.mime().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::transcode::NativeTranscoder;
    use crate::test_fixtures::png_bytes;

    fn queue(max_files: usize) -> UploadQueue {
        let config = IntakeConfig {
            max_files,
            ..IntakeConfig::default()
        };
        UploadQueue::new(config, Arc::new(NativeTranscoder))
    }

    fn pngs(prefix: &str, n: usize) -> Vec<MediaFile> {
        (0..n)
            .map(|i| MediaFile::from_bytes(format!("{}{}.png", prefix, i), Some("image/png"), png_bytes(2, 2)))
            .collect()
    }

    fn names(q: &UploadQueue) -> Vec<String> {
        q.iter().map(|i| i.asset.file.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_append_admits_min_of_selection_and_capacity() {
        let mut q = queue(5);
        q.add_files(pngs("a", 3), AddMode::Append).await.unwrap();

        let outcome = q.add_files(pngs("b", 4), AddMode::Append).await.unwrap();
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.rejections.capacity_exceeded, vec!["b2.png", "b3.png"]);
        assert_eq!(q.len(), 5);
        assert_eq!(names(&q), vec!["a0.png", "a1.png", "a2.png", "b0.png", "b1.png"]);
    }

    #[tokio::test]
    async fn test_replace_discards_previous_entries() {
        let mut q = queue(5);
        q.add_files(pngs("a", 4), AddMode::Append).await.unwrap();
        let outcome = q.add_files(pngs("b", 2), AddMode::Replace).await.unwrap();
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(names(&q), vec!["b0.png", "b1.png"]);
    }

    #[tokio::test]
    async fn test_no_valid_files_leaves_queue_untouched() {
        let mut q = queue(5);
        q.add_files(pngs("a", 1), AddMode::Append).await.unwrap();
        let bad = vec![MediaFile::from_bytes("x.txt", Some("text/plain"), vec![1])];
        let err = q.add_files(bad, AddMode::Replace).await.unwrap_err();
        match err {
            IntakeError::NoValidFiles { summary } => assert_eq!(summary.invalid_type, vec!["x.txt"]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(names(&q), vec!["a0.png"]);
    }

    #[tokio::test]
    async fn test_full_queue_append_reports_no_valid_files() {
        let mut q = queue(2);
        q.add_files(pngs("a", 2), AddMode::Append).await.unwrap();
        let err = q.add_files(pngs("b", 1), AddMode::Append).await.unwrap_err();
        assert!(matches!(err, IntakeError::NoValidFiles { ref summary } if summary.capacity_exceeded.len() == 1));
    }

    #[tokio::test]
    async fn test_remove_shifts_later_entries_down() {
        let mut q = queue(5);
        q.add_files(pngs("p", 5), AddMode::Append).await.unwrap();
        let removed = q.remove_file(1).unwrap();
        assert_eq!(removed.file.name, "p1.png");
        assert_eq!(names(&q), vec!["p0.png", "p2.png", "p3.png", "p4.png"]);
        assert_eq!(q.get(1).unwrap().asset.file.name, "p2.png");
        assert!(q.remove_file(4).is_none());
    }

    #[tokio::test]
    async fn test_trigger_select_at_capacity() {
        let mut q = queue(1);
        assert!(q.trigger_select().is_ok());
        q.add_files(pngs("a", 1), AddMode::Append).await.unwrap();
        assert_eq!(
            q.trigger_select(),
            Err(IntakeError::CapacityExceeded { max_files: 1 })
        );
        q.clear();
        assert!(q.is_empty());
        assert!(q.trigger_select().is_ok());
    }

    #[tokio::test]
    async fn test_asset_ids_are_never_reused() {
        let mut q = queue(5);
        let first = q.add_files(pngs("a", 2), AddMode::Append).await.unwrap();
        q.clear();
        let second = q.add_files(pngs("b", 2), AddMode::Append).await.unwrap();
        assert!(second.accepted.iter().all(|id| !first.accepted.contains(id)));
    }

    #[tokio::test]
    async fn test_patch_for_removed_asset_is_dropped() {
        let mut q = queue(5);
        let outcome = q.add_files(pngs("a", 2), AddMode::Append).await.unwrap();
        let gone = outcome.accepted[0];
        q.remove_file(0);
        let applied = q.apply_patch(PreviewPatch {
            request_id: RequestId(99),
            asset_id: gone,
            update: PatchUpdate::ConversionFinished(PreviewRecord::conversion_failed()),
        });
        assert!(!applied);
        assert_eq!(q.get(0).unwrap().preview.state, PreviewState::Ready);
    }

    #[tokio::test]
    async fn test_snapshot_and_upload_order() {
        let mut q = queue(5);
        q.add_files(pngs("s", 2), AddMode::Append).await.unwrap();
        let snap = q.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[1].index, 1);
        assert_eq!(snap[1].preview_state, PreviewState::Ready);
        assert_eq!(snap[1].preview_mime.as_deref(), Some("image/png"));
        let upload: Vec<&str> = q.upload_files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(upload, vec!["s0.png", "s1.png"]);
        assert_eq!(q.next_patch().await, None);
    }
}
