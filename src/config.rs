use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the site, scheme and host only.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Suffix appended to every document/history title.
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Distance (px) from the bottom of the document at which the
    /// infinite-scroll trigger fires.
    #[serde(default = "default_scroll_margin")]
    pub scroll_margin: u32,
    /// Cache keys ending with one of these suffixes survive a
    /// `clear(keep_protected)` after a mutation.
    #[serde(default = "default_protected_suffixes")]
    pub protected_suffixes: Vec<String>,
}

fn default_base_url() -> String {
    "https://repos.io".to_string()
}

fn default_site_name() -> String {
    "Repos.io".to_string()
}

fn default_scroll_margin() -> u32 {
    200
}

fn default_protected_suffixes() -> Vec<String> {
    vec!["/readme/".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            site_name: default_site_name(),
            scroll_margin: default_scroll_margin(),
            protected_suffixes: default_protected_suffixes(),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("reposio").join("config.toml"))
}

impl Config {
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Config::default();
        };

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };

        toml::from_str::<Config>(&content).unwrap_or_default()
    }
}
