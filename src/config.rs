use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_FILE: &str = "ryotube-downloads.toml";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

pub const ENV_API_URL: &str = "RYOTUBE_API_URL";
pub const ENV_TOKEN: &str = "RYOTUBE_TOKEN";
pub const ENV_DOWNLOAD_DIR: &str = "RYOTUBE_DOWNLOAD_DIR";

/// How received chunks are held until the file is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// Every chunk stays in memory and the file is written once at the end.
    Memory,
    /// Chunks are streamed into a temp file that is renamed into place.
    #[default]
    Disk,
}

/// Raw contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub buffering: Option<BufferMode>,
}

/// Fully resolved settings used by the API client and the download routine.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub download_dir: PathBuf,
    pub buffering: BufferMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            buffering: BufferMode::default(),
        }
    }
}

impl Settings {
    /// Applies environment overrides through `lookup`, normally
    /// `|key| std::env::var(key).ok()`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(token) = non_empty(ENV_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(dir) = non_empty(ENV_DOWNLOAD_DIR) {
            self.download_dir = PathBuf::from(dir);
        }
    }

    fn merge_file(&mut self, cfg: FileConfig) {
        if let Some(url) = cfg.api_base_url {
            self.api_base_url = url;
        }
        if let Some(token) = cfg.api_token.filter(|token| !token.is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(dir) = cfg.download_dir {
            self.download_dir = dir;
        }
        if let Some(buffering) = cfg.buffering {
            self.buffering = buffering;
        }
    }

    fn validate(&self) -> Result<()> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "api_base_url must be an http(s) URL, got {:?}",
                self.api_base_url
            ));
        }
        Ok(())
    }
}

pub fn read_config_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let cfg: FileConfig =
        toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(Some(cfg))
}

/// Resolves settings from the config file at `path` plus the process
/// environment.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

pub fn load_settings_with_env<F>(path: impl AsRef<Path>, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let mut settings = Settings::default();
    if let Some(cfg) = read_config_file(path)? {
        settings.merge_file(cfg);
    }
    settings.apply_env(lookup);
    settings
        .validate()
        .with_context(|| format!("Invalid settings from {}", path.display()))?;
    Ok(settings)
}
