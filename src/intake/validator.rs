use crate::config::IntakeConfig;
use crate::media::model::{MediaFile, MediaKind};
use serde::Serialize;

/// MIME values that say nothing about the content; fall back to the extension.
const AMBIGUOUS_MIMES: &[&str] = &["application/octet-stream", "binary/octet-stream"];
const CONVERTIBLE_MIMES: &[&str] = &["image/heic", "image/heif"];
const CONVERTIBLE_EXTENSIONS: &[&str] = &["heic", "heif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidType,
    TooLarge,
    CapacityExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddMode {
    Replace,
    Append,
}

/// Outcome of a successful per-file check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub kind: MediaKind,
    pub needs_conversion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectReason,
}

/// Lowercased MIME without parameters; None when absent or uninformative.
fn normalized_mime(file: &MediaFile) -> Option<String> {
    let raw = file.declared_mime.as_deref()?;
    let mime = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    if mime.is_empty() || AMBIGUOUS_MIMES.contains(&mime.as_str()) {
        None
    } else {
        Some(mime)
    }
}

fn contains(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v.eq_ignore_ascii_case(value))
}

/// Infer the media kind from the declared MIME, or from the extension when the
/// MIME is missing or ambiguous. A declared but disallowed MIME is not second-guessed.
pub fn detect_kind(file: &MediaFile, config: &IntakeConfig) -> Option<MediaKind> {
    let allowed = &config.allowed_types;
    match normalized_mime(file) {
        Some(mime) => {
            if contains(&allowed.image_mimes, &mime) {
                Some(MediaKind::Image)
            } else if contains(&allowed.video_mimes, &mime) {
                Some(MediaKind::Video)
            } else {
                None
            }
        }
        None => {
            let ext = file.extension()?;
            if contains(&allowed.image_extensions, &ext) {
                Some(MediaKind::Image)
            } else if contains(&allowed.video_extensions, &ext) {
                Some(MediaKind::Video)
            } else {
                None
            }
        }
    }
}

/// True for HEIC/HEIF, which most renderers cannot display without transcoding.
pub fn needs_conversion(file: &MediaFile) -> bool {
    if let Some(mime) = normalized_mime(file) {
        if CONVERTIBLE_MIMES.contains(&mime.as_str()) {
            return true;
        }
    }
    file.extension()
        .map(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Classify one file against the type and size policy. Pure; no logging.
pub fn validate(file: &MediaFile, config: &IntakeConfig) -> Result<Accepted, RejectReason> {
    let kind = detect_kind(file, config).ok_or(RejectReason::InvalidType)?;
    if file.size > config.max_file_size_bytes {
        return Err(RejectReason::TooLarge);
    }
    Ok(Accepted {
        kind,
        needs_conversion: kind == MediaKind::Image && needs_conversion(file),
    })
}

/// Free slots for an incoming selection.
pub fn available_capacity(max_files: usize, current_count: usize, mode: AddMode) -> usize {
    match mode {
        AddMode::Replace => max_files,
        AddMode::Append => max_files.saturating_sub(current_count),
    }
}

#[derive(Debug, Default)]
pub struct IntakeReport {
    /// in selection order
    pub accepted: Vec<(MediaFile, Accepted)>,
    pub rejected: Vec<Rejection>,
}

/// Run `validate` over a selection in order, keeping the first valid files
/// that fit in `available` and rejecting the rest as `CapacityExceeded`.
pub fn classify_batch(
    selection: Vec<MediaFile>,
    config: &IntakeConfig,
    available: usize,
) -> IntakeReport {
    let mut report = IntakeReport::default();
    for file in selection {
        match validate(&file, config) {
            Err(reason) => report.rejected.push(Rejection {
                name: file.name,
                reason,
            }),
            Ok(_) if report.accepted.len() >= available => report.rejected.push(Rejection {
                name: file.name,
                reason: RejectReason::CapacityExceeded,
            }),
            Ok(accepted) => report.accepted.push((file, accepted)),
        }
    }
    report
}

/// All rejections of one selection, aggregated for a single notification.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionSummary {
    pub invalid_type: Vec<String>,
    pub too_large: Vec<String>,
    pub capacity_exceeded: Vec<String>,
}

impl RejectionSummary {
    pub fn from_rejections(rejections: &[Rejection]) -> Self {
        let mut summary = RejectionSummary::default();
        for r in rejections {
            let bucket = match r.reason {
                RejectReason::InvalidType => &mut summary.invalid_type,
                RejectReason::TooLarge => &mut summary.too_large,
                RejectReason::CapacityExceeded => &mut summary.capacity_exceeded,
            };
            bucket.push(r.name.clone());
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.invalid_type.len() + self.too_large.len() + self.capacity_exceeded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        match reason {
            RejectReason::InvalidType => self.invalid_type.len(),
            RejectReason::TooLarge => self.too_large.len(),
            RejectReason::CapacityExceeded => self.capacity_exceeded.len(),
        }
    }
}

impl std::fmt::Display for RejectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.invalid_type.is_empty() {
            parts.push(format!("{} unsupported type", self.invalid_type.len()));
        }
        if !self.too_large.is_empty() {
            parts.push(format!("{} too large", self.too_large.len()));
        }
        if !self.capacity_exceeded.is_empty() {
            parts.push(format!("{} over the file limit", self.capacity_exceeded.len()));
        }
        if parts.is_empty() {
            write!(f, "no files skipped")
        } else {
            write!(f, "{} file(s) skipped: {}", self.total(), parts.join(", "))
        }
    }
}
