//! Configuration system for the webwii loader

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reader: ReaderConfig,
    pub validation: ValidationConfig,
    pub staging: StagingConfig,
    pub install: InstallConfig,
    pub emulator: EmulatorConfig,
    pub debug: DebugConfig,
}

/// Byte source reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Largest chunk requested from a source per read
    pub chunk_size: usize,
}

/// Profile validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub signature_policy: SignaturePolicy,
}

/// What to do when a buffer's leading word matches none of its profile's signatures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SignaturePolicy {
    /// Record a warning and keep going
    #[default]
    Warn,
    /// Treat the mismatch as a validation error
    Reject,
}

/// Staging namespace settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Maximum number of staged entries, 0 for no limit
    pub max_entries: usize,
}

/// Simulated install progress settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub tick_ms: u64,
    pub step_percent: u8,
}

/// Emulator backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub preferred_backend: BackendKind,
    pub allow_fallback: bool,
}

/// Emulator backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    DolphinWasm,
    RetroArch,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DolphinWasm => write!(f, "dolphin-wasm"),
            Self::RetroArch => write!(f, "retroarch"),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// Default implementations

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            step_percent: 5,
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            preferred_backend: BackendKind::default(),
            allow_fallback: true,
        }
    }
}

impl Config {
    /// Load the user configuration, writing the defaults out on first run
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path();
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            return Self::load_from(&path);
        }

        let config = Self::default();
        config.save()?;
        info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Load configuration from an explicit file; missing sections take defaults
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Parsed configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webwii")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.validation.signature_policy, SignaturePolicy::Warn);
        assert_eq!(config.staging.max_entries, 0);
        assert_eq!(config.install.step_percent, 5);
        assert_eq!(config.emulator.preferred_backend, BackendKind::DolphinWasm);
        assert!(config.emulator.allow_fallback);
        assert_eq!(config.reader.chunk_size, 1024 * 1024);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.install.tick_ms, config.install.tick_ms);
        assert_eq!(parsed.emulator.preferred_backend, config.emulator.preferred_backend);
    }

    #[test]
    fn test_partial_config() {
        let parsed = Config::from_toml_str(
            r#"
            [validation]
            signature_policy = "reject"

            [emulator]
            preferred_backend = "retroarch"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.validation.signature_policy, SignaturePolicy::Reject);
        assert_eq!(parsed.emulator.preferred_backend, BackendKind::RetroArch);
        assert!(parsed.emulator.allow_fallback);
        assert_eq!(parsed.install.tick_ms, 100);
    }


    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webwii.toml");
        std::fs::write(&path, "[staging]\nmax_entries = 4\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.staging.max_entries, 4);
        assert_eq!(config.install.tick_ms, 100);

        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
