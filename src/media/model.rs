use std::path::PathBuf;
use std::sync::Arc;

/// Where the bytes of a selected file live.
#[derive(Debug, Clone)]
pub enum FileContents {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// A file handle as delivered by the selection input.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    /// byte size reported by the platform
    pub size: u64,
    /// MIME type declared by the platform; often missing for HEIC
    pub declared_mime: Option<String>,
    pub contents: FileContents,
}

impl MediaFile {
    pub fn from_bytes(name: impl Into<String>, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        MediaFile {
            name: name.into(),
            size: bytes.len() as u64,
            declared_mime: mime.map(str::to_string),
            contents: FileContents::Memory(bytes.into()),
        }
    }

    /// Build a handle for a file on disk. The MIME type is left undeclared so
    /// intake falls back to the extension, like a picker that cannot sniff types.
    pub fn from_path(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default();
        MediaFile {
            name,
            size,
            declared_mime: None,
            contents: FileContents::Disk(path),
        }
    }

    /// Read the whole binary. Never blocks the calling task on disk IO.
    pub async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match &self.contents {
            FileContents::Memory(bytes) => Ok(Arc::clone(bytes)),
            FileContents::Disk(path) => Ok(tokio::fs::read(path).await?.into()),
        }
    }

    /// Lowercase extension of `name`, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Stable identity of a queued asset. Never reused within one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

/// An accepted file owned by the upload queue.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub id: AssetId,
    pub file: MediaFile,
    pub kind: MediaKind,
    /// HEIC/HEIF container, needs transcoding before it can be previewed
    pub needs_conversion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewImage {
    /// The source binary renders as-is
    Original,
    /// Static "preview unavailable" graphic
    Placeholder,
    /// Transcoded rendition of the source
    Encoded {
        format: OutputFormat,
        bytes: Arc<[u8]>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewState {
    Ready,
    Placeholder,
    Converting,
    Converted,
    ConversionFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRecord {
    pub image: PreviewImage,
    pub state: PreviewState,
}

impl PreviewRecord {
    pub fn ready() -> Self {
        PreviewRecord {
            image: PreviewImage::Original,
            state: PreviewState::Ready,
        }
    }

    pub fn placeholder() -> Self {
        PreviewRecord {
            image: PreviewImage::Placeholder,
            state: PreviewState::Placeholder,
        }
    }

    pub fn converted(format: OutputFormat, bytes: Arc<[u8]>) -> Self {
        PreviewRecord {
            image: PreviewImage::Encoded { format, bytes },
            state: PreviewState::Converted,
        }
    }

    /// Failed conversions keep showing the placeholder graphic.
    pub fn conversion_failed() -> Self {
        PreviewRecord {
            image: PreviewImage::Placeholder,
            state: PreviewState::ConversionFailed,
        }
    }

    /// Terminal states accept no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PreviewState::Ready | PreviewState::Converted | PreviewState::ConversionFailed
        )
    }

    /// Move to `Converting`. Only valid from `Placeholder`.
    pub fn begin_conversion(&mut self) -> bool {
        if self.state != PreviewState::Placeholder {
            return false;
        }
        self.state = PreviewState::Converting;
        true
    }

    /// Replace with the outcome of a conversion. A terminal record is never
    /// overwritten, so `Converted` cannot fall back to a placeholder.
    pub fn finish_conversion(&mut self, outcome: PreviewRecord) -> bool {
        if self.is_terminal() {
            return false;
        }
        if !matches!(
            outcome.state,
            PreviewState::Converted | PreviewState::ConversionFailed
        ) {
            return false;
        }
        *self = outcome;
        true
    }
}

/// Decimal-degree position, always inside `[-90,90] x [-180,180]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GpsCoordinate {
    latitude: f64,
    longitude: f64,
}

impl GpsCoordinate {
    /// Returns None for NaN, infinities and anything out of range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if is_valid_coordinate(latitude, longitude) {
            Some(GpsCoordinate {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    /// Parse textual coordinates, e.g. from a form field or a sidecar.
    pub fn parse(latitude: &str, longitude: &str) -> Option<Self> {
        let lat = latitude.trim().parse::<f64>().ok()?;
        let lng = longitude.trim().parse::<f64>().ok()?;
        Self::new(lat, lng)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
