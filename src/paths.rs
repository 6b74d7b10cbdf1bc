//! Well-known filesystem locations.
//!
//! Everything the appliance reads or writes lives under one base directory:
//! - `config.json` - the persisted configuration tree
//! - `assets/background.png` - OLED background (uploaded or converted)
//! - `assets/boot.wav` - boot sound (uploaded or the generated beep)
//! - `default-background.*` - optional bundled image converted on first start
//!
//! ## Environment Variables
//! - `RIBBON_HOME` - Base directory (default: `<config_dir>/ribbon`)
//! - `RIBBON_CONFIG_PATH` - Explicit config file (overrides the base dir)
//! - `RIBBON_ASSETS_DIR` - Assets directory (default: `<base>/assets`)

use std::path::{Path, PathBuf};

/// Config file name inside the base directory.
pub const CONFIG_FILE: &str = "config.json";
/// Background image name inside the assets directory.
pub const BACKGROUND_FILE: &str = "background.png";
/// Boot sound name inside the assets directory.
pub const BOOT_SOUND_FILE: &str = "boot.wav";

/// Resolved locations for config and assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Persisted configuration tree.
    pub config_file: PathBuf,
    /// Directory holding uploaded and generated assets.
    pub assets_dir: PathBuf,
    /// Optional bundled image converted to the background on first start.
    pub default_background: PathBuf,
}

impl AppPaths {
    /// Discover paths from environment and platform defaults.
    pub fn discover() -> Self {
        let base = std::env::var("RIBBON_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("ribbon")))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut paths = Self::under(&base);

        if let Ok(config_path) = std::env::var("RIBBON_CONFIG_PATH") {
            paths.config_file = PathBuf::from(config_path);
        }
        if let Ok(assets_dir) = std::env::var("RIBBON_ASSETS_DIR") {
            paths.assets_dir = PathBuf::from(assets_dir);
        }

        paths
    }

    /// Lay out every path under a single base directory.
    pub fn under(base: &Path) -> Self {
        Self {
            config_file: base.join(CONFIG_FILE),
            assets_dir: base.join("assets"),
            default_background: base.join("default-background.png"),
        }
    }

    /// Replace the config file location, keeping the rest.
    pub fn with_config_file(mut self, config_file: impl Into<PathBuf>) -> Self {
        self.config_file = config_file.into();
        self
    }

    /// Where uploaded or converted backgrounds are stored.
    pub fn background_path(&self) -> PathBuf {
        self.assets_dir.join(BACKGROUND_FILE)
    }

    /// Where uploaded or generated boot sounds are stored.
    pub fn boot_sound_path(&self) -> PathBuf {
        self.assets_dir.join(BOOT_SOUND_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_lays_out_assets() {
        let paths = AppPaths::under(Path::new("/opt/ribbon"));
        assert_eq!(paths.config_file, PathBuf::from("/opt/ribbon/config.json"));
        assert_eq!(
            paths.background_path(),
            PathBuf::from("/opt/ribbon/assets/background.png")
        );
        assert_eq!(
            paths.boot_sound_path(),
            PathBuf::from("/opt/ribbon/assets/boot.wav")
        );
    }

    #[test]
    fn test_with_config_file_overrides_only_config() {
        let paths = AppPaths::under(Path::new("/base")).with_config_file("/etc/ribbon.yaml");
        assert_eq!(paths.config_file, PathBuf::from("/etc/ribbon.yaml"));
        assert_eq!(paths.assets_dir, PathBuf::from("/base/assets"));
    }
}
