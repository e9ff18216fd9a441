use crate::media::model::OutputFormat;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Turns an image binary the previewer cannot render into one it can.
#[async_trait]
pub trait ImageTranscoder: Send + Sync {
    async fn transcode(&self, source: &[u8], target: OutputFormat, quality: u8) -> Result<Vec<u8>>;
}

/// Pipes the source through ImageMagick (`magick - -quality Q jpeg:-`).
/// Needs a build of ImageMagick with the libheif delegate for HEIC input.
pub struct MagickTranscoder {
    pub program: String,
}

impl Default for MagickTranscoder {
    fn default() -> Self {
        MagickTranscoder {
            program: "magick".to_string(),
        }
    }
}

fn magick_format(target: OutputFormat) -> &'static str {
    match target {
        OutputFormat::Jpeg => "jpeg",
        OutputFormat::Webp => "webp",
    }
}

#[async_trait]
impl ImageTranscoder for MagickTranscoder {
    async fn transcode(&self, source: &[u8], target: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .arg("-")
            .arg("-quality")
            .arg(quality.clamp(1, 100).to_string())
            .arg(format!("{}:-", magick_format(target)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", self.program))?;

        let mut stdin = child.stdin.take().context("magick stdin unavailable")?;
        let input = source.to_vec();
        let writer = tokio::spawn(async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        });

        let output = child
            .wait_with_output()
            .await
            .context("waiting for magick")?;
        writer
            .await
            .context("magick stdin writer")?
            .context("writing magick stdin")?;

        if !output.status.success() {
            bail!(
                "magick exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            bail!("magick produced no output");
        }
        Ok(output.stdout)
    }
}

/// Re-encodes anything the `image` crate can decode. It cannot read HEIC, so
/// for those inputs it fails and the preview keeps its placeholder.
#[derive(Default)]
pub struct NativeTranscoder;

#[async_trait]
impl ImageTranscoder for NativeTranscoder {
    async fn transcode(&self, source: &[u8], target: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let img = image::load_from_memory(source).context("decoding source image")?;
        let mut out: Vec<u8> = Vec::new();
        match target {
            OutputFormat::Jpeg => {
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut out,
                    quality.clamp(1, 100),
                );
                image::DynamicImage::ImageRgb8(img.to_rgb8())
                    .write_with_encoder(encoder)
                    .context("encoding JPEG")?;
            }
            // the image crate only writes lossless WEBP, quality does not apply
            OutputFormat::Webp => {
                image::DynamicImage::ImageRgba8(img.to_rgba8())
                    .write_to(&mut Cursor::new(&mut out), image::ImageFormat::WebP)
                    .context("encoding WEBP")?;
            }
        }
        Ok(out)
    }
}
