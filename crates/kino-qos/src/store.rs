//! Local persisted store
//!
//! A small string key/value store survives across sessions on the device. It
//! holds the buffering-tolerance profile and the one-shot "unknown buffering
//! seen" flag.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key of the buffering profile blob
pub const BUFFERING_PROFILE_KEY: &str = "kino.qos.bufferingProfile";

/// Key of the flag written the first time unknown buffering is seen
pub const UNKNOWN_BUFFERING_FLAG_KEY: &str = "kino.qos.encounteredUnknownBuffering";

/// Current profile layout version
pub const BUFFERING_PROFILE_VERSION: u32 = 2;

/// Retained per-session buffering ratios
pub const BUFFER_RATIO_WINDOW: usize = 10;

/// Persisted string key/value store
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON file, rewritten on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStore {
    /// Open the store; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    fn flush(&self, key: &str) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, raw).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Store write failed");
            Error::StoreWrite { key: key.to_string() }
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush(key)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush(key)?;
        }
        Ok(())
    }
}

/// Device buffering-tolerance bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingGroup {
    Low,
    Medium,
    High,
}

impl BufferingGroup {
    /// Bucket for a mean buffering ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.01 {
            BufferingGroup::Low
        } else if ratio < 0.05 {
            BufferingGroup::Medium
        } else {
            BufferingGroup::High
        }
    }
}

/// Versioned profile blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferingProfile {
    pub version: u32,
    pub created_at: i64,
    pub group: BufferingGroup,
    pub buffer_ratio_window: Vec<f64>,
    pub last_updated: i64,
}

impl BufferingProfile {
    pub fn new(now: i64) -> Self {
        Self {
            version: BUFFERING_PROFILE_VERSION,
            created_at: now,
            group: BufferingGroup::Low,
            buffer_ratio_window: Vec::new(),
            last_updated: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != BUFFERING_PROFILE_VERSION {
            return Err(Error::InvalidProfile(format!("version {}", self.version)));
        }
        if self.buffer_ratio_window.len() > BUFFER_RATIO_WINDOW {
            return Err(Error::InvalidProfile("ratio window too long".into()));
        }
        if self
            .buffer_ratio_window
            .iter()
            .any(|r| !r.is_finite() || !(0.0..=1.0).contains(r))
        {
            return Err(Error::InvalidProfile("ratio out of range".into()));
        }
        if self.last_updated < self.created_at {
            return Err(Error::InvalidProfile("last update precedes creation".into()));
        }
        Ok(())
    }

    /// Load the stored profile; a missing, unparsable or invalid blob is replaced
    /// by a fresh one. The flag is true when a new profile was created.
    pub fn load_or_create(store: &mut dyn KeyValueStore, now: i64) -> Result<(Self, bool)> {
        if let Some(raw) = store.get(BUFFERING_PROFILE_KEY)? {
            let parsed = serde_json::from_str::<BufferingProfile>(&raw)
                .map_err(Error::from)
                .and_then(|profile| profile.validate().map(|_| profile));
            match parsed {
                Ok(profile) => return Ok((profile, false)),
                Err(e) => debug!(error = %e, "Recreating buffering profile"),
            }
        }
        let profile = Self::new(now);
        profile.save(store)?;
        Ok((profile, true))
    }

    /// Add one session's buffering ratio and re-bucket
    pub fn record_ratio(&mut self, ratio: f64, now: i64) {
        if !ratio.is_finite() {
            return;
        }
        if self.buffer_ratio_window.len() >= BUFFER_RATIO_WINDOW {
            self.buffer_ratio_window.remove(0);
        }
        self.buffer_ratio_window.push(ratio.clamp(0.0, 1.0));
        let mean = self.buffer_ratio_window.iter().sum::<f64>() / self.buffer_ratio_window.len() as f64;
        self.group = BufferingGroup::from_ratio(mean);
        self.last_updated = now.max(self.created_at);
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        store.set(BUFFERING_PROFILE_KEY, &serde_json::to_string(self)?)
    }
}

/// Set the unknown-buffering flag; true if this is the first time on the device
pub fn mark_unknown_buffering(store: &mut dyn KeyValueStore) -> Result<bool> {
    if store.get(UNKNOWN_BUFFERING_FLAG_KEY)?.is_some() {
        return Ok(false);
    }
    store.set(UNKNOWN_BUFFERING_FLAG_KEY, "1")?;
    Ok(true)
}
