//! Key-value storage for session and app settings.
//!
//! The badge collection does not depend on this module; it holds the small
//! pieces of state the app keeps next to it (auth token, user profile, app
//! settings). The store is an LMDB environment in a `<name>.lmdb` directory.
//! [`clear_all_data`] is the logout path and also empties the collection.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::badge_store::BadgeStore;
use crate::error::{StoreError, StoreResult};

pub const USER_KEY: &str = "user_data";
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const SETTINGS_KEY: &str = "app_settings";

const SETTINGS_DB: &str = "settings";
const MAP_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Opaque string storage.
pub trait SettingsStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Returns `false` if the key was not present.
    fn remove(&self, key: &str) -> StoreResult<bool>;

    fn save_user(&self, user: &UserProfile) -> StoreResult<()> {
        self.set(USER_KEY, &serde_json::to_string(user)?)
    }

    /// A stored profile that no longer parses reads as no profile.
    fn user(&self) -> StoreResult<Option<UserProfile>> {
        let Some(raw) = self.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Stored user profile is unreadable: {e}");
                Ok(None)
            }
        }
    }

    fn clear_user(&self) -> StoreResult<()> {
        self.remove(USER_KEY).map(|_| ())
    }

    fn save_auth_token(&self, token: &str) -> StoreResult<()> {
        self.set(AUTH_TOKEN_KEY, token)
    }

    fn auth_token(&self) -> StoreResult<Option<String>> {
        self.get(AUTH_TOKEN_KEY)
    }

    fn clear_auth_token(&self) -> StoreResult<()> {
        self.remove(AUTH_TOKEN_KEY).map(|_| ())
    }

    fn save_settings(&self, settings: &Map<String, JsonValue>) -> StoreResult<()> {
        self.set(SETTINGS_KEY, &serde_json::to_string(settings)?)
    }

    /// Missing or unreadable settings read as an empty map.
    fn settings(&self) -> StoreResult<Map<String, JsonValue>> {
        let Some(raw) = self.get(SETTINGS_KEY)? else {
            return Ok(Map::new());
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Stored settings are unreadable: {e}");
                Ok(Map::new())
            }
        }
    }

    /// Drops the profile, the token and the settings.
    fn clear_all(&self) -> StoreResult<()> {
        for key in [USER_KEY, AUTH_TOKEN_KEY, SETTINGS_KEY] {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Logout: clears the session keys, then every badge.
///
/// Both halves always run. A settings failure is reported ahead of an
/// incomplete badge clear.
pub fn clear_all_data<S>(settings: &S, badges: &BadgeStore) -> StoreResult<()>
where
    S: SettingsStore + ?Sized,
{
    let settings_result = settings.clear_all();
    let badges_cleared = badges.clear_all_badges();

    settings_result?;
    if !badges_cleared {
        return Err(StoreError::ClearIncomplete(badges.root().to_path_buf()));
    }
    info!("Session data and badge collection cleared");
    Ok(())
}

pub struct LmdbSettingsStore {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbSettingsStore {
    /// Opens or creates `<name>.lmdb`.
    pub fn open(name: impl AsRef<Path>) -> StoreResult<Self> {
        let mut dir = name.as_ref().as_os_str().to_owned();
        dir.push(".lmdb");
        let path = PathBuf::from(dir);

        fs::create_dir_all(&path).map_err(|e| StoreError::write(&path, e))?;

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(MAP_SIZE)
            .open(&path)?;
        let db = env.create_db(Some(SETTINGS_DB), DatabaseFlags::empty())?;

        info!("Settings store opened at {}", path.display());
        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for LmdbSettingsStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        debug!("Setting {key} stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &key, None) {
            Ok(()) => {
                txn.commit()?;
                Ok(true)
            }
            Err(lmdb::Error::NotFound) => {
                txn.abort();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
