use crate::config::PartialGlobeConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub globe: PartialGlobeConfig,
    #[serde(default)]
    pub poll: PollSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollSettings {
    pub url: Option<String>,     // Used by `live` when no URL is given
    pub interval_secs: Option<f32>,
    pub hub: Option<String>,     // Region every active region routes to
    pub timeout_secs: Option<u64>,
    /// Upstream region names mapped onto canonical ones
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Settings {
    /// Read settings from `path`, or the default location. A missing or
    /// unreadable file yields defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map_or_else(Self::config_path, Path::to_path_buf);
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed settings");
                Self::default()
            }),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not read settings");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termglobe")
            .join("config.toml")
    }
}
