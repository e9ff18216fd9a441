use crate::intake::transcode::ImageTranscoder;
use crate::media::model::{MediaAsset, MediaFile, OutputFormat, PreviewRecord};
use futures::future::BoxFuture;
use std::io::Cursor;
use std::sync::{Arc, OnceLock};

/// Conversion targets, tried in order.
const CONVERSION_TARGETS: [OutputFormat; 2] = [OutputFormat::Jpeg, OutputFormat::Webp];

const PLACEHOLDER_WIDTH: u32 = 320;
const PLACEHOLDER_HEIGHT: u32 = 240;

/// Result of `build_preview`: what to show now, and the work that may improve it.
pub struct BuiltPreview {
    pub immediate: PreviewRecord,
    /// resolves to `Converted` or `ConversionFailed`; never errors
    pub pending: Option<BoxFuture<'static, PreviewRecord>>,
}

impl std::fmt::Debug for BuiltPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPreview")
            .field("immediate", &self.immediate)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

#[derive(Clone)]
pub struct PreviewAdapter {
    transcoder: Arc<dyn ImageTranscoder>,
    quality: u8,
}

impl PreviewAdapter {
    pub fn new(transcoder: Arc<dyn ImageTranscoder>, quality: u8) -> Self {
        PreviewAdapter {
            transcoder,
            quality,
        }
    }

    /// Natively renderable assets are `Ready` at once. HEIC/HEIF get the
    /// placeholder now and a conversion future the caller schedules.
    pub fn build_preview(&self, asset: &MediaAsset) -> BuiltPreview {
        if !asset.needs_conversion {
            return BuiltPreview {
                immediate: PreviewRecord::ready(),
                pending: None,
            };
        }
        let transcoder = Arc::clone(&self.transcoder);
        let file = asset.file.clone();
        let quality = self.quality;
        BuiltPreview {
            immediate: PreviewRecord::placeholder(),
            pending: Some(Box::pin(async move {
                convert(transcoder.as_ref(), &file, quality).await
            })),
        }
    }
}

async fn convert(transcoder: &dyn ImageTranscoder, file: &MediaFile, quality: u8) -> PreviewRecord {
    let bytes = match file.read().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("preview: cannot read {:?} for conversion: {}", file.name, e);
            return PreviewRecord::conversion_failed();
        }
    };

    for target in CONVERSION_TARGETS {
        match transcoder.transcode(&bytes, target, quality).await {
            Ok(out) if !out.is_empty() => {
                tracing::debug!(
                    "preview: converted {:?} to {:?} ({} bytes)",
                    file.name,
                    target,
                    out.len()
                );
                return PreviewRecord::converted(target, out.into());
            }
            Ok(_) => tracing::debug!("preview: empty {:?} output for {:?}", target, file.name),
            Err(e) => tracing::debug!("preview: {:?} conversion of {:?} failed: {:#}", target, file.name, e),
        }
    }

    tracing::warn!(
        "preview: no conversion succeeded for {:?}, keeping placeholder",
        file.name
    );
    PreviewRecord::conversion_failed()
}

/// The static "preview unavailable, converts after upload" graphic as PNG bytes.
/// Generated once; identical on every call.
pub fn placeholder_png() -> &'static [u8] {
    static PLACEHOLDER: OnceLock<Vec<u8>> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| match render_placeholder() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("preview: cannot render placeholder: {}", e);
            Vec::new()
        }
    })
}

fn render_placeholder() -> image::ImageResult<Vec<u8>> {
    let background = image::Rgb([229u8, 231, 235]);
    let ink = image::Rgb([156u8, 163, 175]);
    let (w, h) = (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);

    // grey card with a 4px frame and a picture glyph in the middle
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        let frame = x < 4 || y < 4 || x >= w - 4 || y >= h - 4;
        let (cx, cy) = (x as i64 - (w / 2) as i64, y as i64 - (h / 2) as i64);
        let glyph_box = cx.abs() <= 40 && cy.abs() <= 30 && (cx.abs() >= 37 || cy.abs() >= 27);
        let mountain = (0..=27).contains(&cy) && cx.abs() <= 37 && cx.abs() <= 27 - cy + 10;
        if frame || glyph_box || mountain {
            ink
        } else {
            background
        }
    });

    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}
