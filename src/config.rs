use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::jp2::DEFAULT_TMP_SUFFIX;

/// Top-level configuration for jp2-fits.
///
/// Controls which codec binaries are used, how the two-pass write names its
/// first-pass file, and output behavior (dry run, backups).
///
/// # Loading
///
/// ```rust,no_run
/// use jp2_fits::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.codec.compress_bin = "/opt/openjpeg/bin/opj_compress".into();
/// config.codec.compress_args = vec!["-r".into(), "20".into()];
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External JPEG 2000 codec settings.
    pub codec: CodecConfig,
    /// Settings for writing JP2 files.
    pub write: WriteConfig,
    /// Output behavior (dry run, backups).
    pub output: OutputConfig,
}

/// OpenJPEG command-line tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Encoder binary (name on `PATH` or full path).
    pub compress_bin: String,
    /// Decoder binary (name on `PATH` or full path).
    pub decompress_bin: String,
    /// Extra encoder arguments, e.g. `["-r", "20"]` for lossy output.
    pub compress_args: Vec<String>,
}

/// Two-pass write settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Suffix appended to the destination for the first-pass file. Must end in `.jp2`.
    pub tmp_suffix: String,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, preview header edits without modifying any files.
    pub dry_run: bool,
    /// If `true`, create a `.bak` backup before modifying a file.
    pub backup_originals: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            write: WriteConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup_originals: true,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress_bin: "opj_compress".to_string(),
            decompress_bin: "opj_decompress".to_string(),
            compress_args: Vec::new(),
        }
    }
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            tmp_suffix: DEFAULT_TMP_SUFFIX.to_string(),
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject settings the writer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.write.tmp_suffix.to_ascii_lowercase().ends_with(".jp2") {
            anyhow::bail!(
                "write.tmp_suffix {:?} must end in .jp2 so the codec writes a JP2 container",
                self.write.tmp_suffix
            );
        }
        if self.codec.compress_bin.is_empty() || self.codec.decompress_bin.is_empty() {
            anyhow::bail!("codec binaries must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.codec.compress_bin, "opj_compress");
        assert_eq!(config.codec.decompress_bin, "opj_decompress");
        assert_eq!(config.write.tmp_suffix, ".tmp.jp2");
        assert!(config.output.backup_originals);
        assert!(!config.output.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.write.tmp_suffix, DEFAULT_TMP_SUFFIX);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.codec.compress_args = vec!["-r".into(), "20".into()];
        config.output.dry_run = true;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.codec.compress_args, ["-r", "20"]);
        assert!(loaded.output.dry_run);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"codec": {"compress_bin": "/usr/local/bin/opj_compress"}}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.codec.compress_bin, "/usr/local/bin/opj_compress");
        assert_eq!(config.codec.decompress_bin, "opj_decompress");
        assert_eq!(config.write.tmp_suffix, DEFAULT_TMP_SUFFIX);
    }

    #[test]
    fn rejects_non_jp2_suffix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"write": {"tmp_suffix": ".tmp"}}"#).unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
