use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{AppError, CredentialKind, Result};
use crate::models::{Settings, SettingsPatch};

pub const SETTINGS_STORAGE_KEY: &str = "explainer-settings";

/// Durable string key/value storage for small records.
pub trait SettingsStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SettingsStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        write_replace(&path, value).map_err(|e| {
            AppError::Storage(format!("failed to write {}: {}", path.display(), e))
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(e.to_string())),
        }
    }
}

// Write to a sibling temp file and rename over the target so readers never
// see a half-written record.
fn write_replace(path: &Path, value: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, value)?;
    fs::rename(&tmp, path)
}

/// In-process cache of the user's settings backed by a storage record.
pub struct SettingsStore {
    storage: Box<dyn SettingsStorage>,
    current: Settings,
}

impl SettingsStore {
    /// Loads the persisted record. Missing, unreadable or malformed data
    /// yields the defaults.
    pub fn initialize(storage: Box<dyn SettingsStorage>) -> Self {
        let current = match storage.get_item(SETTINGS_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Settings>(&raw) {
                Ok(mut settings) => {
                    settings.normalize();
                    settings
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed settings record: {}", e);
                    Settings::default()
                }
            },
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!("Failed to read settings, using defaults: {}", e);
                Settings::default()
            }
        };

        tracing::debug!(
            model = %current.generation_model,
            level = current.user_level,
            "Settings initialized"
        );
        Self { storage, current }
    }

    pub fn get_all(&self) -> Settings {
        self.current.clone()
    }

    pub fn get_key(&self, kind: CredentialKind) -> String {
        self.current.key(kind).to_string()
    }

    pub fn get_model(&self) -> String {
        self.current.model().to_string()
    }

    /// Merges `patch` into the live settings and writes the whole record.
    /// The merged values stay live even if the write fails.
    pub fn save(&mut self, patch: SettingsPatch) -> Result<()> {
        self.current.merge(patch);
        let raw = serde_json::to_string(&self.current)?;
        self.storage
            .set_item(SETTINGS_STORAGE_KEY, &raw)
            .map_err(|e| match e {
                AppError::Storage(_) => e,
                other => AppError::Storage(other.to_string()),
            })?;
        tracing::info!("Settings saved");
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.current = Settings::default();
        self.storage.remove_item(SETTINGS_STORAGE_KEY)?;
        tracing::info!("Settings reset to defaults");
        Ok(())
    }
}
