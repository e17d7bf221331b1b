// Config Module - TOML configuration for the controller daemon
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Address the HTTP server binds to.
    pub listen: String,
    /// JSON file holding the calibrated LED coordinates.
    pub locations_file: PathBuf,
    /// Directory for derived data such as the geodesic distance cache.
    pub cache_dir: PathBuf,
    /// SQLite database for presets.
    pub database_file: PathBuf,
    /// WLED controller address. Empty disables output; frames are rendered
    /// into memory only.
    pub wled_ip: String,
    /// Wire order of the color channels on the strip.
    pub channel_order: String,
    /// Run the chase sequence once on startup.
    pub startup_sequence: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            listen: "0.0.0.0:8080".to_string(),
            locations_file: PathBuf::from("locations.json"),
            cache_dir: PathBuf::from("cache"),
            database_file: PathBuf::from("presets.db"),
            wled_ip: "".to_string(),
            channel_order: "grb".to_string(),
            startup_sequence: true,
        }
    }
}

impl TreeConfig {
    /// Load from a TOML file. A missing file yields the defaults; a present
    /// but malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("treelight.toml"));
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(TreeConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: TreeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.sanitize();
        Ok(config)
    }

    fn sanitize(&mut self) {
        self.listen = self.listen.trim().to_string();
        self.wled_ip = self.wled_ip.trim().to_string();
        self.channel_order = self.channel_order.trim().to_lowercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TreeConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(config.wled_ip.is_empty());
        assert!(config.startup_sequence);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treelight.toml");
        std::fs::write(
            &path,
            "listen = \"127.0.0.1:9000\"\nwled_ip = \" 10.0.0.5 \"\nchannel_order = \"RGB\"\n",
        )
        .unwrap();
        let config = TreeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.wled_ip, "10.0.0.5");
        assert_eq!(config.channel_order, "rgb");
        // Untouched keys keep their defaults
        assert_eq!(config.database_file, PathBuf::from("presets.db"));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treelight.toml");
        std::fs::write(&path, "listen = [not toml").unwrap();
        assert!(TreeConfig::load(Some(&path)).is_err());
    }
}
