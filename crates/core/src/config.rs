use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_FILE_PATTERN: &str = r"^VRChat_.+\.png$";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub immich_url: String,
    pub api_key: String,
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
}

/// One watched folder as written in the config file. Missing fields are
/// filled in by [`FolderConfig::revalidate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub max_depth: Option<i64>,
    #[serde(default)]
    pub file_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub time_remappers: Option<Vec<RemapRuleConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRuleConfig {
    /// Regex with a `time` named group.
    pub pattern: String,
    /// Date layout such as `yyyy-MM-dd-HH-mm-ss-SSS`.
    pub layout: String,
}

impl AppConfig {
    pub fn default_vrchat() -> Self {
        Self {
            immich_url: "https://immich.yourdomain.com".to_string(),
            api_key: "0".repeat(43),
            folders: vec![FolderConfig::vrchat()],
        }
    }

    pub fn revalidate(&self) -> Self {
        Self {
            immich_url: self.immich_url.clone(),
            api_key: self.api_key.clone(),
            folders: self.folders.iter().map(FolderConfig::revalidate).collect(),
        }
    }
}

impl FolderConfig {
    pub fn vrchat() -> Self {
        let path = pictures_dir().join("VRChat");
        Self {
            path: Some(path.to_string_lossy().into_owned()),
            album_id: None,
            max_depth: Some(0),
            file_patterns: Some(vec![DEFAULT_FILE_PATTERN.to_string()]),
            time_remappers: Some(vrchat_remappers()),
        }
    }

    pub fn revalidate(&self) -> Self {
        let file_patterns = match &self.file_patterns {
            Some(p) if !p.is_empty() => p.clone(),
            _ => vec![DEFAULT_FILE_PATTERN.to_string()],
        };
        Self {
            path: Some(self.path.clone().unwrap_or_default()),
            album_id: Some(self.album_id.clone().unwrap_or_default()),
            max_depth: Some(self.max_depth.unwrap_or(0).max(0)),
            file_patterns: Some(file_patterns),
            time_remappers: Some(
                self.time_remappers
                    .clone()
                    .unwrap_or_else(vrchat_remappers),
            ),
        }
    }
}

/// The two layouts VRChat uses for screenshot names, most precise first.
pub fn vrchat_remappers() -> Vec<RemapRuleConfig> {
    vec![
        RemapRuleConfig {
            pattern: r"(?<time>\d{4}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2}[.]\d{3})"
                .to_string(),
            layout: "yyyy-MM-dd-HH-mm-ss-SSS".to_string(),
        },
        RemapRuleConfig {
            pattern: r"(?<time>\d{4}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2}[-_.]\d{2})".to_string(),
            layout: "yyyy-MM-dd-HH-mm-ss".to_string(),
        },
    ]
}

/// The user's pictures folder, or `~/Pictures` where the platform has no
/// such notion.
fn pictures_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("Pictures"))
}

pub fn load(path: &Path) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::new(
            &path.to_string_lossy(),
            config::FileFormat::Json,
        ))
        .build()
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(settings.try_deserialize()?)
}

pub fn save(path: &Path, cfg: &AppConfig) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Loads the config at `path`, writing a default one first if it is missing.
/// A config that needed revalidation is written back in its completed form.
pub fn load_or_bootstrap(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.is_file() {
        let cfg = AppConfig::default_vrchat().revalidate();
        save(path, &cfg)?;
        warn!(path = %path.display(), "no config found, wrote a default one");
        return Ok(cfg);
    }

    let cfg = load(path)?;
    let revalidated = cfg.revalidate();
    if revalidated != cfg {
        save(path, &revalidated)?;
        info!(path = %path.display(), "filled in missing config values");
    }
    Ok(revalidated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revalidate_fills_defaults() {
        let folder = FolderConfig {
            path: Some("/pics".into()),
            max_depth: Some(-3),
            file_patterns: Some(vec![]),
            ..Default::default()
        };
        let rev = folder.revalidate();
        assert_eq!(rev.max_depth, Some(0));
        assert_eq!(rev.album_id.as_deref(), Some(""));
        assert_eq!(rev.file_patterns, Some(vec![DEFAULT_FILE_PATTERN.to_string()]));
        assert_eq!(rev.time_remappers, Some(vrchat_remappers()));
        assert_eq!(rev.revalidate(), rev);
    }

    #[test]
    fn default_folder_lives_under_pictures() {
        let path = PathBuf::from(FolderConfig::vrchat().path.unwrap());
        assert!(path.ends_with("VRChat"));
        assert_eq!(path.parent(), Some(pictures_dir().as_path()));
    }

    #[test]
    fn explicit_empty_remappers_stay_empty() {
        let folder = FolderConfig {
            time_remappers: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(folder.revalidate().time_remappers, Some(vec![]));
    }

    #[test]
    fn bootstrap_writes_a_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = load_or_bootstrap(&path).unwrap();
        assert!(path.is_file());
        assert_eq!(cfg.folders.len(), 1);
        assert_eq!(load(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_folder_is_completed_and_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "immich_url": "http://localhost:2283",
                "api_key": "key",
                "folders": [{ "path": "/pics", "album_id": "album" }]
            }"#,
        )
        .unwrap();

        let cfg = load_or_bootstrap(&path).unwrap();
        let folder = &cfg.folders[0];
        assert_eq!(folder.path.as_deref(), Some("/pics"));
        assert_eq!(folder.album_id.as_deref(), Some("album"));
        assert_eq!(folder.max_depth, Some(0));
        assert_eq!(load(&path).unwrap(), cfg);
    }
}
