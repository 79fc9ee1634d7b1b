use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use stockroom_core::Role;
use stockroom_storage::SettingsStore;

use crate::error::EngineError;

/// Persisted setting keys.
pub mod keys {
    pub const PERMANENT_FILE: &str = "permanentFile";
    pub const CLOUD_FOLDER: &str = "cloudFolder";
    pub const SYNC_ENABLED: &str = "syncEnabled";
    pub const CURRENT_USER: &str = "currentUser";
    pub const USER_ROLE: &str = "userRole";
    pub const LAST_SYNC_TIME: &str = "lastSyncTime";
}

pub const DEFAULT_USER: &str = "User";
pub const NEVER_SYNCED: &str = "Never";

/// Everything the coordinators need to know about this installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub canonical_file: Option<PathBuf>,
    pub cloud_folder: Option<PathBuf>,
    pub sync_enabled: bool,
    pub current_user: String,
    pub role: Role,
    pub last_sync_time: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            canonical_file: None,
            cloud_folder: None,
            sync_enabled: false,
            current_user: DEFAULT_USER.to_string(),
            role: Role::Editor,
            last_sync_time: NEVER_SYNCED.to_string(),
        }
    }
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}

fn path_setting(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl SyncConfig {
    pub fn load(store: &dyn SettingsStore) -> Result<Self, EngineError> {
        let defaults = Self::default();

        let role = match store.get(keys::USER_ROLE)? {
            None => defaults.role,
            Some(raw) => Role::parse(&raw).unwrap_or_else(|_| {
                log::warn!("unknown stored role '{raw}', treating as viewer");
                Role::Viewer
            }),
        };

        Ok(Self {
            canonical_file: non_empty_path(store.get(keys::PERMANENT_FILE)?),
            cloud_folder: non_empty_path(store.get(keys::CLOUD_FOLDER)?),
            sync_enabled: store
                .get(keys::SYNC_ENABLED)?
                .is_some_and(|v| matches!(v.trim(), "true" | "1")),
            current_user: store
                .get(keys::CURRENT_USER)?
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.current_user),
            role,
            last_sync_time: store
                .get(keys::LAST_SYNC_TIME)?
                .unwrap_or(defaults.last_sync_time),
        })
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<(), EngineError> {
        store.set(keys::PERMANENT_FILE, &path_setting(&self.canonical_file))?;
        store.set(keys::CLOUD_FOLDER, &path_setting(&self.cloud_folder))?;
        store.set(keys::SYNC_ENABLED, if self.sync_enabled { "true" } else { "false" })?;
        store.set(keys::CURRENT_USER, &self.current_user)?;
        store.set(keys::USER_ROLE, self.role.as_str())?;
        store.set(keys::LAST_SYNC_TIME, &self.last_sync_time)?;
        Ok(())
    }

    pub fn can_edit(&self) -> bool {
        self.role.can_edit()
    }

    /// Where `document` lives inside the cloud folder: same file name,
    /// folder swapped.
    pub fn cloud_path_for(&self, document: &Path) -> Option<PathBuf> {
        let folder = self.cloud_folder.as_ref()?;
        let name = document.file_name()?;
        Some(folder.join(name))
    }
}

pub fn format_sync_time(at: SystemTime) -> String {
    DateTime::<Local>::from(at).format("%Y-%m-%d %H:%M:%S").to_string()
}
