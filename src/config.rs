//! `tally` configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use filetally_core::{ChecksumConfig, ScanConfig};

/// Name of the per-user directory under the platform config and data dirs.
pub const APP_DIR: &str = "filetally";

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Settings loaded from `config.toml`. Every field is optional.
///
/// ```toml
/// state_dir = "/var/lib/filetally"
/// output_dir = "/srv/manifests"
///
/// [scan]
/// roots = ["/home/user/photos"]
/// ignore_patterns = [".git", "*.tmp"]
///
/// [checksum]
/// flush_interval = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TallyConfig {
    /// Where the resume state and history live.
    pub state_dir: Option<PathBuf>,
    /// Where candidate lists and checksum manifests are written.
    pub output_dir: Option<PathBuf>,
    /// Walk settings; command-line roots replace `roots`.
    pub scan: ScanConfig,
    /// Checksum run settings.
    pub checksum: ChecksumConfig,
}

impl TallyConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration text and validate it.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.checksum.flush_interval == 0 {
            bail!("checksum.flush_interval must be at least 1");
        }
        if self.checksum.chunk_size == 0 {
            bail!("checksum.chunk_size must be at least 1");
        }
        self.scan
            .ignore_matcher()
            .context("Invalid scan.ignore_patterns")?;
        Ok(())
    }

    /// Directory holding the resume state and history.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// Directory receiving manifests. Defaults to the state directory.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| self.state_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_config() {
        let config = TallyConfig::parse(
            r#"
            state_dir = "/state"

            [scan]
            roots = ["/data"]
            include_hidden = false

            [checksum]
            flush_interval = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.state_dir(), PathBuf::from("/state"));
        assert_eq!(config.output_dir(), PathBuf::from("/state"));
        assert_eq!(config.scan.roots, vec![PathBuf::from("/data")]);
        assert!(!config.scan.include_hidden);
        assert_eq!(config.checksum.flush_interval, 7);
        assert_eq!(config.checksum.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TallyConfig::parse("").unwrap();
        assert_eq!(config.checksum.flush_interval, 100);
        assert_eq!(config.scan.roots, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(TallyConfig::parse("[checksum]\nflush_interval = 0\n").is_err());
        assert!(TallyConfig::parse("[scan]\nignore_patterns = [\"[bad\"]\n").is_err());
        assert!(TallyConfig::parse("unknown_key = 1\n").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "output_dir = \"/out\"\n").unwrap();

        let config = TallyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.output_dir(), PathBuf::from("/out"));

        assert!(TallyConfig::load(Some(&temp.path().join("missing.toml"))).is_err());
    }
}
