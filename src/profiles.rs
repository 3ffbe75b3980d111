//! Saved connection profiles.
//!
//! [`ProfileStore`] keeps the list in memory and writes the whole list back
//! through a [`ProfilePersistence`] after every mutation. A mutation whose
//! save fails is undone, so the list always matches the last successful save.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;

use crate::ssh::{AuthMethod, ConnectionProfile};

/// File name used by [`JsonFilePersistence::in_dir`].
pub const PROFILES_FILE: &str = "profiles.v1.json";

/// Storage for the profile list.
pub trait ProfilePersistence {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<ConnectionProfile>>, anyhow::Error>;

    fn save(&self, profiles: &[ConnectionProfile]) -> Result<(), anyhow::Error>;
}

/// Pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/profiles.v1.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(PROFILES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfilePersistence for JsonFilePersistence {
    fn load(&self) -> Result<Option<Vec<ConnectionProfile>>, anyhow::Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let profiles = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(profiles))
    }

    fn save(&self, profiles: &[ConnectionProfile]) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(profiles)?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}

/// In-process persistence.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<Vec<ConnectionProfile>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: Vec<ConnectionProfile>) -> Self {
        Self {
            saved: Mutex::new(Some(profiles)),
        }
    }

    /// What the last `save` wrote.
    pub fn saved(&self) -> Option<Vec<ConnectionProfile>> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProfilePersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<Vec<ConnectionProfile>>, anyhow::Error> {
        Ok(self.saved())
    }

    fn save(&self, profiles: &[ConnectionProfile]) -> Result<(), anyhow::Error> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("profile storage lock poisoned"))?;
        *saved = Some(profiles.to_vec());
        Ok(())
    }
}

/// A profile before the store has assigned it an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProfile {
    pub host: String,
    pub port: u16,
    pub auth: AuthMethod,
    pub tmux_attach: Option<String>,
    pub description: Option<String>,
}

impl NewProfile {
    fn into_profile(self) -> ConnectionProfile {
        let mut profile = ConnectionProfile::new(self.host, self.port, self.auth);
        profile.tmux_attach = self.tmux_attach;
        profile.description = self.description;
        profile
    }
}

pub struct ProfileStore<P> {
    persistence: P,
    profiles: Vec<ConnectionProfile>,
    recent: Option<String>,
}

impl<P: ProfilePersistence> ProfileStore<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            profiles: Vec::new(),
            recent: None,
        }
    }

    /// Replace the in-memory list with what the backend holds.
    ///
    /// Missing data leaves the list empty. Unreadable or corrupt data is
    /// logged and the current list is kept.
    pub fn hydrate(&mut self) {
        match self.persistence.load() {
            Ok(Some(profiles)) => {
                log::info!("Loaded {} connection profiles", profiles.len());
                self.profiles = profiles;
            }
            Ok(None) => log::debug!("No saved connection profiles"),
            Err(e) => log::warn!("Failed to load connection profiles: {:#}", e),
        }
    }

    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    pub fn get(&self, id: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Append a profile under a fresh id and persist.
    pub fn add(&mut self, profile: NewProfile) -> Result<ConnectionProfile, anyhow::Error> {
        let profile = profile.into_profile();
        self.profiles.push(profile.clone());
        if let Err(e) = self.persist() {
            self.profiles.pop();
            return Err(e);
        }
        Ok(profile)
    }

    /// Replace the profile with the same id. Returns `false` when there is
    /// none; nothing is written in that case.
    pub fn update(&mut self, profile: ConnectionProfile) -> Result<bool, anyhow::Error> {
        let Some(slot) = self.profiles.iter_mut().find(|p| p.id == profile.id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(slot, profile.clone());
        if let Err(e) = self.persist() {
            if let Some(slot) = self.profiles.iter_mut().find(|p| p.id == profile.id) {
                *slot = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool, anyhow::Error> {
        let Some(index) = self.profiles.iter().position(|p| p.id == id) else {
            return Ok(false);
        };
        let removed = self.profiles.remove(index);
        if let Err(e) = self.persist() {
            self.profiles.insert(index, removed);
            return Err(e);
        }
        if self.recent.as_deref() == Some(id) {
            self.recent = None;
        }
        Ok(true)
    }

    /// Remember the last used profile. Not persisted.
    pub fn set_recent(&mut self, id: impl Into<String>) {
        self.recent = Some(id.into());
    }

    pub fn recent(&self) -> Option<&ConnectionProfile> {
        self.recent.as_deref().and_then(|id| self.get(id))
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    fn persist(&self) -> Result<(), anyhow::Error> {
        self.persistence
            .save(&self.profiles)
            .context("saving connection profiles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(host: &str) -> NewProfile {
        NewProfile {
            host: host.to_string(),
            port: 22,
            auth: AuthMethod::Password {
                username: "u".to_string(),
                password: "p".to_string(),
            },
            tmux_attach: Some("tmux attach || tmux new".to_string()),
            description: None,
        }
    }

    #[test]
    fn test_add_assigns_id_and_persists() {
        let mut store = ProfileStore::new(MemoryPersistence::new());
        let a = store.add(new_profile("a")).unwrap();
        let b = store.add(new_profile("b")).unwrap();

        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
        assert_eq!(a.tmux_attach.as_deref(), Some("tmux attach || tmux new"));
        assert_eq!(store.persistence().saved(), Some(vec![a, b]));
    }

    #[test]
    fn test_update_and_delete() {
        let mut store = ProfileStore::new(MemoryPersistence::new());
        let mut profile = store.add(new_profile("a")).unwrap();
        let other = store.add(new_profile("b")).unwrap();

        profile.description = Some("prod".to_string());
        assert!(store.update(profile.clone()).unwrap());
        assert_eq!(store.get(&profile.id), Some(&profile));
        assert_eq!(store.profiles()[1], other);

        let mut unknown = profile.clone();
        unknown.id = "missing".to_string();
        assert!(!store.update(unknown).unwrap());

        assert!(store.delete(&profile.id).unwrap());
        assert!(!store.delete(&profile.id).unwrap());
        assert_eq!(store.persistence().saved(), Some(vec![other]));
    }

    /// Accepts the first `allowed` saves, then fails every one after.
    struct FlakyPersistence {
        allowed: usize,
        saves: Mutex<usize>,
    }

    impl ProfilePersistence for FlakyPersistence {
        fn load(&self) -> Result<Option<Vec<ConnectionProfile>>, anyhow::Error> {
            Ok(None)
        }

        fn save(&self, _profiles: &[ConnectionProfile]) -> Result<(), anyhow::Error> {
            let mut saves = self.saves.lock().unwrap();
            *saves += 1;
            if *saves > self.allowed {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_save_leaves_list_unchanged() {
        let mut store = ProfileStore::new(FlakyPersistence {
            allowed: 2,
            saves: Mutex::new(0),
        });
        let a = store.add(new_profile("a")).unwrap();
        let b = store.add(new_profile("b")).unwrap();
        store.set_recent(a.id.clone());

        let err = store.add(new_profile("c")).unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(store.profiles(), &[a.clone(), b.clone()]);

        let mut renamed = a.clone();
        renamed.description = Some("renamed".to_string());
        assert!(store.update(renamed).is_err());
        assert_eq!(store.get(&a.id), Some(&a));

        assert!(store.delete(&a.id).is_err());
        assert_eq!(store.profiles(), &[a.clone(), b]);
        assert_eq!(store.recent(), Some(&a));
    }

    #[test]
    fn test_recent_profile() {
        let mut store = ProfileStore::new(MemoryPersistence::new());
        let profile = store.add(new_profile("a")).unwrap();
        assert!(store.recent().is_none());

        store.set_recent(profile.id.clone());
        assert_eq!(store.recent(), Some(&profile));

        store.delete(&profile.id).unwrap();
        assert!(store.recent().is_none());
    }

    #[test]
    fn test_hydrate_from_memory() {
        let saved = vec![new_profile("a").into_profile()];
        let mut store = ProfileStore::new(MemoryPersistence::with_profiles(saved.clone()));
        assert!(store.profiles().is_empty());
        store.hydrate();
        assert_eq!(store.profiles(), saved.as_slice());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonFilePersistence::in_dir(dir.path().join("nested"));
        assert_eq!(persistence.load().unwrap(), None);

        let mut store = ProfileStore::new(persistence.clone());
        let added = store.add(new_profile("a")).unwrap();

        let raw = fs::read_to_string(persistence.path()).unwrap();
        assert!(raw.contains("\"tmuxAttach\""));
        assert!(raw.contains('\n'));

        let mut reloaded = ProfileStore::new(persistence);
        reloaded.hydrate();
        assert_eq!(reloaded.profiles(), &[added]);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonFilePersistence::in_dir(dir.path());
        fs::write(persistence.path(), "{not json").unwrap();
        assert!(persistence.load().is_err());

        let mut store = ProfileStore::new(persistence);
        store.hydrate();
        assert!(store.profiles().is_empty());
    }
}
