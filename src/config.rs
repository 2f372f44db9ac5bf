use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::loader::DEFAULT_TIMEOUT_SECS;
use crate::url::Source;

pub const KEY_SOURCES: &str = "sources";
pub const KEY_TIMEOUT_SECS: &str = "timeout_secs";
pub const KEY_DEFAULT_PROJECT: &str = "default_project";

/// Flat key/value settings persisted as JSON.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Open the config at the default path (`~/.dorareport/config.json`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".dorareport");
        Self::open_at(dir.join("config.json")).await
    }

    /// Open the config at the given path. A missing file is an empty config.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;
        self.values.insert(key.to_string(), value.to_string());
        self.save().await
    }

    /// Returns whether the key was set.
    pub async fn remove(&mut self, key: &str) -> Result<bool> {
        let removed = self.values.remove(key).is_some();
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<(&str, &str)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Configured metric sources, in the order they should be tried.
    pub fn sources(&self) -> Result<Vec<Source>> {
        self.get(KEY_SOURCES)
            .map(parse_sources)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn timeout(&self) -> Result<Duration> {
        match self.get(KEY_TIMEOUT_SECS) {
            Some(v) => parse_timeout(v),
            None => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    pub fn default_project(&self) -> Option<&str> {
        self.get(KEY_DEFAULT_PROJECT).filter(|p| !p.trim().is_empty())
    }

    async fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(&self.values)?;
        tokio::fs::write(&self.path, body).await?;
        log::debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

fn parse_sources(value: &str) -> Result<Vec<Source>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Source::parse)
        .collect()
}

fn parse_timeout(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "{KEY_TIMEOUT_SECS} must be a positive number of seconds, got {value:?}"
        ))),
    }
}

fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_SOURCES => parse_sources(value).map(|_| ()),
        KEY_TIMEOUT_SECS => parse_timeout(value).map(|_| ()),
        KEY_DEFAULT_PROJECT => Ok(()),
        other => {
            log::warn!("Unrecognised config key {other}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ConfigStore::open_at(dir.path().join("config.json")).await.unwrap();
        assert!(cfg.list().is_empty());
        assert_eq!(cfg.timeout().unwrap(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(cfg.sources().unwrap().is_empty());
        assert!(cfg.default_project().is_none());
    }

    #[tokio::test]
    async fn test_set_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut cfg = ConfigStore::open_at(&path).await.unwrap();
        cfg.set(KEY_SOURCES, "https://example.com/calculations, ./calculations")
            .await
            .unwrap();
        cfg.set(KEY_TIMEOUT_SECS, "30").await.unwrap();
        cfg.set(KEY_DEFAULT_PROJECT, "TrailEquip").await.unwrap();

        let cfg = ConfigStore::open_at(&path).await.unwrap();
        assert_eq!(cfg.sources().unwrap().len(), 2);
        assert_eq!(cfg.timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(cfg.default_project(), Some("TrailEquip"));
        assert_eq!(cfg.list().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ConfigStore::open_at(dir.path().join("config.json")).await.unwrap();
        assert!(cfg.set(KEY_TIMEOUT_SECS, "soon").await.is_err());
        assert!(cfg.set(KEY_TIMEOUT_SECS, "0").await.is_err());
        assert!(cfg.set(KEY_SOURCES, "https://").await.is_err());
        assert!(cfg.get(KEY_TIMEOUT_SECS).is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = ConfigStore::open_at(&path).await.unwrap();
        cfg.set(KEY_DEFAULT_PROJECT, "A").await.unwrap();

        assert!(cfg.remove(KEY_DEFAULT_PROJECT).await.unwrap());
        assert!(!cfg.remove(KEY_DEFAULT_PROJECT).await.unwrap());
        let cfg = ConfigStore::open_at(&path).await.unwrap();
        assert!(cfg.get(KEY_DEFAULT_PROJECT).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(matches!(ConfigStore::open_at(&path).await, Err(Error::Config(_))));
    }
}
