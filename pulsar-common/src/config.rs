//! Settings loading and per-user settings file resolution
//!
//! Settings live in one flat JSON object at `~/.pulsar.json`. On first run the
//! file does not exist yet and is bootstrapped by copying a bundled template.
//! Writes merge the given keys into the in-memory object and rewrite the whole
//! file (last write wins).

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// File name of the per-user settings file
pub const SETTINGS_FILE_NAME: &str = ".pulsar.json";

/// Flat key -> value settings object
pub type Settings = Map<String, Value>;

/// Settings store, constructed once at startup and shared by `Arc`
pub struct SettingsService {
    file_path: PathBuf,
    template_path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsService {
    /// Create a service for an explicit settings file and template
    pub fn new(file_path: impl Into<PathBuf>, template_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            template_path: template_path.into(),
            settings: RwLock::new(Settings::new()),
        }
    }

    /// Create a service for the current user's settings file (`~/.pulsar.json`)
    pub fn for_current_user(template_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = default_settings_path()?;
        Ok(Self::new(file_path, template_path))
    }

    /// Path of the settings file
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Path of the bundled template used for bootstrap
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Load settings from disk
    ///
    /// A missing file triggers a template bootstrap followed by exactly one
    /// retry. Any other read or parse failure is logged and returned.
    pub async fn load(&self) -> Result<Settings> {
        let loaded = match read_settings(&self.file_path).await {
            Ok(settings) => settings,
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Settings file {} does not exist, bootstrapping from {}",
                    self.file_path.display(),
                    self.template_path.display()
                );
                self.bootstrap().await?;
                read_settings(&self.file_path).await.map_err(|e| {
                    error!("Failed to read bootstrapped settings: {}", e);
                    e
                })?
            }
            Err(e) => {
                error!("Failed to load settings from {}: {}", self.file_path.display(), e);
                return Err(e);
            }
        };

        debug!("Loaded {} settings keys", loaded.len());
        *self.settings.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Merge `patch` into the current settings and rewrite the whole file
    pub async fn save(&self, patch: Settings) -> Result<Settings> {
        let mut settings = self.settings.write().await;
        for (key, value) in patch {
            settings.insert(key, value);
        }

        let content = serde_json::to_string_pretty(&*settings)?;
        write_atomic(&self.file_path, content.as_bytes()).await.map_err(|e| {
            error!("Failed to write settings to {}: {}", self.file_path.display(), e);
            e
        })?;

        info!("Settings saved to {}", self.file_path.display());
        Ok(settings.clone())
    }

    /// Snapshot of all settings currently in memory
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Raw value of one key
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.settings.read().await.get(key).cloned()
    }

    /// Typed value of one key; `Ok(None)` when the key is absent
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Config(format!("Invalid value for '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    async fn bootstrap(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&self.template_path, &self.file_path)
            .await
            .map_err(|e| {
                error!(
                    "Failed to copy settings template {}: {}",
                    self.template_path.display(),
                    e
                );
                Error::Config(format!(
                    "Cannot bootstrap settings from {}: {}",
                    self.template_path.display(),
                    e
                ))
            })?;
        info!("Settings template copied to {}", self.file_path.display());
        Ok(())
    }
}

/// Default per-user settings file location
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(SETTINGS_FILE_NAME))
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
}

async fn read_settings(path: &Path) -> Result<Settings> {
    let bytes = tokio::fs::read(path).await?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Config(format!(
            "Settings file must hold a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Write via a temp file and rename so readers never see a half-written file
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_existing_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, r#"{"softwares": {"maya": "/opt/maya"}}"#).unwrap();

        let service = SettingsService::new(&file, dir.path().join("missing-template.json"));
        let settings = service.load().await.unwrap();

        assert_eq!(settings["softwares"]["maya"], "/opt/maya");
        assert_eq!(service.get("softwares").await.unwrap()["maya"], "/opt/maya");
    }

    #[tokio::test]
    async fn test_non_object_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, "[1, 2, 3]").unwrap();

        let service = SettingsService::new(&file, dir.path().join("template.json"));
        assert!(matches!(service.load().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_get_as_reports_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, r#"{"event_capacity": "lots"}"#).unwrap();

        let service = SettingsService::new(&file, dir.path().join("template.json"));
        service.load().await.unwrap();

        assert!(service.get_as::<usize>("event_capacity").await.is_err());
        assert_eq!(service.get_as::<usize>("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        std::fs::write(&file, "{}").unwrap();

        let service = SettingsService::new(&file, dir.path().join("template.json"));
        service.load().await.unwrap();

        let mut patch = Settings::new();
        patch.insert("nodes".to_string(), json!("/pipeline/nodes"));
        service.save(patch).await.unwrap();

        assert!(file.exists());
        assert!(!dir.path().join("settings.json.tmp").exists());
    }
}
