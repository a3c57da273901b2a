use anyhow::{Context, Result};
use docaudit_model::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[model] api_key`.
pub const API_KEY_ENV: &str = "DOCAUDIT_GEMINI_API_KEY";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Relative paths resolve against the root; `~` is expanded.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".docaudit/docaudit.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { batch_size: 3 }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse docaudit.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Load `<root>/.docaudit/docaudit.toml`, writing defaults on first use,
    /// then apply environment overrides.
    pub fn load_or_init(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        let cfg = if path.exists() {
            Self::load_from(&path)?
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            cfg
        };
        Ok(cfg.with_api_key_override(std::env::var(API_KEY_ENV).ok()))
    }

    /// A non-blank override replaces the file's key.
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.model.api_key = Some(key.trim().to_string());
        }
        self
    }

    pub fn batch_size(&self) -> usize {
        self.worker.batch_size.max(1)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".docaudit").join("docaudit.toml")
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.store.path).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_open_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_init(dir.path()).unwrap();
        assert!(Config::config_path(dir.path()).exists());
        assert_eq!(cfg.worker.batch_size, 3);
        assert_eq!(cfg.db_path(dir.path()), dir.path().join(".docaudit/docaudit.db"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[worker]\nbatch_size = 0\n\n[model]\nmodel = \"m2\"\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.batch_size(), 1);
        assert_eq!(cfg.model.model, "m2");
        assert_eq!(cfg.model.generate_timeout_secs, 180);
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn api_key_override_ignores_blank_values() {
        let mut cfg = Config::default();
        cfg.model.api_key = Some("from-file".into());

        let kept = cfg.clone().with_api_key_override(Some("  ".into()));
        assert_eq!(kept.model.api_key.as_deref(), Some("from-file"));

        let replaced = cfg.with_api_key_override(Some(" from-env ".into()));
        assert_eq!(replaced.model.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn absolute_store_path_is_kept() {
        let mut cfg = Config::default();
        cfg.store.path = "/var/lib/docaudit/db.sqlite".into();
        assert_eq!(cfg.db_path(Path::new("/srv")), PathBuf::from("/var/lib/docaudit/db.sqlite"));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        let mut cfg = Config::default();
        cfg.worker.batch_size = 5;
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }
}
