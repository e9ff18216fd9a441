use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FILES: usize = 5;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_CONVERSION_QUALITY: u8 = 92;

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_quality() -> u8 {
    DEFAULT_CONVERSION_QUALITY
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// MIME and extension allow-sets, split by media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedTypes {
    pub image_mimes: Vec<String>,
    pub video_mimes: Vec<String>,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
}

impl Default for AllowedTypes {
    fn default() -> Self {
        AllowedTypes {
            image_mimes: strings(&[
                "image/jpeg",
                "image/jpg",
                "image/png",
                "image/gif",
                "image/webp",
                "image/heic",
                "image/heif",
            ]),
            video_mimes: strings(&[
                "video/mp4",
                "video/webm",
                "video/quicktime",
                "video/x-msvideo",
                "video/x-m4v",
                "video/x-matroska",
                "video/3gpp",
                "video/hevc",
            ]),
            image_extensions: strings(&["jpg", "jpeg", "png", "gif", "webp", "heic", "heif"]),
            video_extensions: strings(&["mp4", "webm", "mov", "avi", "m4v", "mkv", "3gp", "hevc"]),
        }
    }
}

/// Intake policy, stored in ~/.pothole-media/config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default)]
    pub allowed_types: AllowedTypes,
    /// 1-100, shared by the JPEG and WEBP conversion targets
    #[serde(default = "default_quality")]
    pub conversion_quality: u8,
    #[serde(default)]
    pub poster: PosterConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        IntakeConfig {
            max_files: DEFAULT_MAX_FILES,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_types: AllowedTypes::default(),
            conversion_quality: DEFAULT_CONVERSION_QUALITY,
            poster: PosterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosterConfig {
    pub detail_width: u32,
    pub thumbnail_width: u32,
    pub max_siblings: usize,
    pub at_seconds: f64,
}

impl Default for PosterConfig {
    fn default() -> Self {
        PosterConfig {
            detail_width: 640,
            thumbnail_width: 160,
            max_siblings: 5,
            at_seconds: 1.0,
        }
    }
}

pub fn config_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".pothole-media"))
}

/// Read `config.json` under `home`. A missing file yields the defaults; a file
/// that does not parse is logged and also yields the defaults.
pub fn read_config(home: &Path) -> Result<IntakeConfig> {
    let path = home.join("config.json");
    if !path.exists() {
        return Ok(IntakeConfig::default());
    }
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str(&text) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!("config: ignoring unparsable {:?}: {}", path, e);
            Ok(IntakeConfig::default())
        }
    }
}

pub fn write_config(home: &Path, config: &IntakeConfig) -> Result<()> {
    std::fs::create_dir_all(home).with_context(|| format!("creating {}", home.display()))?;
    let tmp = home.join("config.json.tmp");
    let path = home.join("config.json");
    let text = serde_json::to_string_pretty(config).context("serializing config")?;
    std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_home() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_defaults() {
        let c = IntakeConfig::default();
        assert_eq!(c.max_files, 5);
        assert_eq!(c.max_file_size_bytes, 52_428_800);
        assert!(c.allowed_types.image_mimes.contains(&"image/heic".to_string()));
        assert!(c.allowed_types.video_mimes.contains(&"video/hevc".to_string()));
        assert_eq!(c.poster.max_siblings, 5);
    }

    #[test]
    fn test_read_missing_config_returns_default() {
        let tmp = temp_home();
        let c = read_config(tmp.path()).unwrap();
        assert_eq!(c, IntakeConfig::default());
    }

    #[test]
    fn test_write_then_read() {
        let tmp = temp_home();
        let config = IntakeConfig {
            max_files: 9,
            ..IntakeConfig::default()
        };
        write_config(tmp.path(), &config).unwrap();
        assert!(!tmp.path().join("config.json.tmp").exists());
        assert_eq!(read_config(tmp.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let tmp = temp_home();
        std::fs::write(tmp.path().join("config.json"), r#"{"max_files": 2}"#).unwrap();
        let c = read_config(tmp.path()).unwrap();
        assert_eq!(c.max_files, 2);
        assert_eq!(c.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE_BYTES);
        assert_eq!(c.allowed_types, AllowedTypes::default());
    }

    #[test]
    fn test_corrupt_config_falls_back_to_default() {
        let tmp = temp_home();
        std::fs::write(tmp.path().join("config.json"), "{ not json").unwrap();
        assert_eq!(read_config(tmp.path()).unwrap(), IntakeConfig::default());
    }

    #[test]
    fn test_write_config_error_names_the_path() {
        // WHY: a bare io::Error ("Not a directory") does not say which path failed
        let tmp = temp_home();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let err = write_config(&blocker, &IntakeConfig::default()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("creating"), "got: {}", message);
        assert!(message.contains("not-a-dir"), "got: {}", message);
    }
}
