mod env;
mod types;


pub use types::*;

use std::io::Write;
use std::path::Path;

use anyhow::Context;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Write the configuration back to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).context("failed to create config directory")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).context("failed to create temp file")?;
        tmp.write_all(content.as_bytes())
            .context("failed to write config")?;
        tmp.persist(path).context("failed to replace config file")?;
        Ok(())
    }
}

/// Replace `index.files` in the config file at `path`, leaving every other
/// setting as written on disk (env overrides are not baked in).
///
/// # Errors
///
/// Returns an error if the existing file cannot be parsed or the write fails.
pub fn save_tracked_files(path: &Path, files: &[TrackedFile]) -> anyhow::Result<()> {
    let mut on_disk = if path.exists() {
        let content = std::fs::read_to_string(path).context("failed to read config file")?;
        toml::from_str::<Config>(&content).context("failed to parse config file")?
    } else {
        Config::default()
    };
    on_disk.index.files = files.to_vec();
    on_disk.save(path)
}
