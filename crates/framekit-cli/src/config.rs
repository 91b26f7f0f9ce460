//! Benchmark configuration.

use anyhow::{Context, Result};
use framekit_core::{PANEL_HEIGHT, PANEL_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Benchmark run description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Decode/transfer repetitions per entry
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// CSV output path; stdout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Emulated panel geometry
    #[serde(default)]
    pub panel: PanelConfig,

    /// Images to decode
    #[serde(default, rename = "image")]
    pub images: Vec<ImageEntry>,

    /// Solid fills to transfer
    #[serde(default, rename = "blit")]
    pub blits: Vec<BlitEntry>,
}

/// Panel geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_panel_width")]
    pub width: u16,

    #[serde(default = "default_panel_height")]
    pub height: u16,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width: default_panel_width(),
            height: default_panel_height(),
        }
    }
}

/// One image file to benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Path, relative to the configuration file
    pub path: PathBuf,

    /// Codec name or "auto"
    #[serde(default = "default_format")]
    pub format: String,

    /// Width, required for raw formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,

    /// Height, required for raw formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u16>,

    /// Palette preset for headerless pal256/pal16 dumps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,

    /// JPEG only: decode at 1/8 scale
    #[serde(default)]
    pub reduce: bool,
}

/// One solid fill to benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlitEntry {
    /// Surface format: rgb565, pal256 or pal16
    #[serde(default = "default_blit_format")]
    pub format: String,

    /// Palette preset for palette formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<String>,

    /// "#RRGGBB" for RGB565, a palette index otherwise
    #[serde(default = "default_fill")]
    pub fill: String,
}

// Default value functions
fn default_iterations() -> u32 {
    20
}

fn default_panel_width() -> u16 {
    PANEL_WIDTH
}

fn default_panel_height() -> u16 {
    PANEL_HEIGHT
}

fn default_format() -> String {
    "auto".to_string()
}

fn default_blit_format() -> String {
    "rgb565".to_string()
}

fn default_fill() -> String {
    "#000000".to_string()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            output: None,
            panel: PanelConfig::default(),
            images: Vec::new(),
            blits: vec![
                BlitEntry {
                    format: "rgb565".to_string(),
                    palette: None,
                    fill: "#FF0000".to_string(),
                },
                BlitEntry {
                    format: "pal256".to_string(),
                    palette: Some("rgb676".to_string()),
                    fill: "17".to_string(),
                },
                BlitEntry {
                    format: "pal16".to_string(),
                    palette: Some("default".to_string()),
                    fill: "7".to_string(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.iterations, 20);
        assert_eq!((config.panel.width, config.panel.height), (160, 128));
        assert!(config.images.is_empty());
        assert!(config.output.is_none());
    }

    #[test]
    fn test_parse_entries() {
        let config: Config = toml::from_str(
            r##"
            iterations = 5

            [panel]
            width = 128

            [[image]]
            path = "logo.p16"
            format = "pal16"
            width = 32
            height = 16
            palette = "c64"

            [[image]]
            path = "photo.jpg"

            [[blit]]
            format = "pal16"
            fill = "3"
            "##,
        )
        .unwrap();
        assert_eq!(config.iterations, 5);
        assert_eq!((config.panel.width, config.panel.height), (128, 128));
        assert_eq!(config.images.len(), 2);
        assert_eq!(config.images[0].palette.as_deref(), Some("c64"));
        assert_eq!(config.images[1].format, "auto");
        assert!(!config.images[1].reduce);
        assert_eq!(config.blits[0].fill, "3");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("framekit-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.output = Some(PathBuf::from("bench.csv"));
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.blits.len(), 3);
        assert_eq!(loaded.blits[1].palette.as_deref(), Some("rgb676"));
        assert_eq!(loaded.output, Some(PathBuf::from("bench.csv")));
    }
}
