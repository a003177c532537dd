// Configuration shared by the example binaries.
//
// Settings come from demo.toml when it exists, with environment variables
// layered on top. Missing or broken files fall back to defaults so the
// examples always start.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const VALIDATION_ENV: &str = "DEMO_USE_VALIDATION";
pub const OUTPUT_ENV: &str = "DEMO_OUTPUT";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DemoConfig {
    pub debug: DebugConfig,
    pub output: OutputConfig,
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: false,
        }
    }
}

/// Image dump settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("out.ppm"),
        }
    }
}

impl DemoConfig {
    /// Load configuration from demo.toml plus the environment.
    pub fn load() -> Self {
        let base = Self::load_from_path("demo.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load demo.toml: {}. Using defaults.", e);
            DemoConfig::default()
        });

        base.apply_env(
            std::env::var(VALIDATION_ENV).ok().as_deref(),
            std::env::var(OUTPUT_ENV).ok().as_deref(),
        )
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(DemoConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: DemoConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Layer environment overrides on top of the file settings.
    ///
    /// Validation turns on when DEMO_USE_VALIDATION is exactly "1"; any other
    /// set value turns it off. An unset variable leaves the file setting alone.
    fn apply_env(mut self, validation: Option<&str>, output: Option<&str>) -> Self {
        if let Some(value) = validation {
            self.debug.validation_layers = value == "1";
        }
        if let Some(path) = output {
            if !path.is_empty() {
                self.output.path = PathBuf::from(path);
            }
        }
        self
    }

    pub fn validation(&self) -> bool {
        self.debug.validation_layers
    }

    pub fn output(&self) -> &Path {
        &self.output.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_quiet_and_write_out_ppm() {
        let config = DemoConfig::default();
        assert!(!config.validation());
        assert_eq!(config.output(), Path::new("out.ppm"));
    }

    #[test]
    fn validation_env_must_be_exactly_one() {
        let on = DemoConfig::default().apply_env(Some("1"), None);
        assert!(on.validation());

        for value in ["0", "true", "yes", "", " 1"] {
            let off = DemoConfig::default().apply_env(Some(value), None);
            assert!(!off.validation(), "{:?} should not enable validation", value);
        }
    }

    #[test]
    fn unset_env_keeps_file_setting() {
        let mut config = DemoConfig::default();
        config.debug.validation_layers = true;
        let config = config.apply_env(None, None);
        assert!(config.validation());
    }

    #[test]
    fn env_can_disable_file_enabled_validation() {
        let mut config = DemoConfig::default();
        config.debug.validation_layers = true;
        let config = config.apply_env(Some("0"), None);
        assert!(!config.validation());
    }

    #[test]
    fn output_env_overrides_path() {
        let config = DemoConfig::default().apply_env(None, Some("frame.ppm"));
        assert_eq!(config.output(), Path::new("frame.ppm"));

        let config = DemoConfig::default().apply_env(None, Some(""));
        assert_eq!(config.output(), Path::new("out.ppm"));
    }

    #[test]
    fn toml_layer_parses() {
        let config: DemoConfig = toml::from_str(
            r#"
            [debug]
            validation_layers = true

            [output]
            path = "dump/triangle.ppm"
            "#,
        )
        .unwrap();
        assert!(config.validation());
        assert_eq!(config.output(), Path::new("dump/triangle.ppm"));
    }
}
