//! Record cache with TTL-based expiration.
//!
//! Learned records are keyed by (lowercased name, record type). The whole
//! map sits behind one mutex shared by lookups, inserts and the sweep.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dns::{RecordData, RecordType};
use crate::error::{Error, Result};

/// TTL applied to records that arrive with a TTL of zero.
pub const DEFAULT_TTL: u32 = 300;

const SNAPSHOT_VERSION: u32 = 1;

/// Source of wall-clock time for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

struct CacheEntry {
    data: RecordData,
    ttl: u32,
    expires_at: SystemTime,
}

type Entries = FxHashMap<RecordType, FxHashMap<String, CacheEntry>>;

/// TTL-bounded store of records learned from upstream replies.
///
/// Uses a 2-level map (type -> name -> entry) so lookups borrow the name
/// instead of building an owned key.
pub struct RecordCache {
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            clock,
        }
    }

    /// Look up a record. An entry whose expiry has passed is removed and
    /// reported as a miss.
    pub fn get(&self, name: &str, rtype: RecordType) -> Option<RecordData> {
        let name = normalize(name);
        let now = self.clock.now();

        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let inner = entries.get_mut(&rtype)?;
        let entry = inner.get(&*name)?;
        if now < entry.expires_at {
            return Some(entry.data.clone());
        }

        inner.remove(&*name);
        None
    }

    /// Store a record, replacing any existing entry for the same name and
    /// type. A TTL of zero is replaced with [`DEFAULT_TTL`].
    pub fn set(&self, name: &str, data: RecordData, ttl: u32) {
        let ttl = if ttl == 0 { DEFAULT_TTL } else { ttl };
        let expires_at = self.clock.now() + Duration::from_secs(ttl.into());
        self.insert(name, data, ttl, expires_at);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();

        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let mut removed = 0;
        for inner in entries.values_mut() {
            let before = inner.len();
            inner.retain(|_, entry| now < entry.expires_at);
            removed += before - inner.len();
        }
        entries.retain(|_, inner| !inner.is_empty());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|e| e.values().map(|inner| inner.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a cache from a snapshot, falling back to an empty cache if the
    /// file is missing or unreadable.
    pub fn load_snapshot(path: &Path, clock: Arc<dyn Clock>) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "No cache snapshot, starting empty");
            return Self::with_clock(clock);
        }

        match Self::read_snapshot(path, clock.clone()) {
            Ok(cache) => {
                info!(path = %path.display(), entries = cache.len(), "Restored cache snapshot");
                cache
            }
            Err(e) => {
                warn!(error = %e, "Ignoring cache snapshot, starting empty");
                Self::with_clock(clock)
            }
        }
    }

    /// Read a snapshot strictly, failing on any I/O, format or version
    /// problem. Entries that have already expired are skipped.
    pub fn read_snapshot(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| Error::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|source| Error::SnapshotFormat {
                path: path.to_path_buf(),
                source,
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotVersion {
                path: path.to_path_buf(),
                found: snapshot.version,
            });
        }

        let cache = Self::with_clock(clock);
        let now = cache.clock.now();
        for entry in snapshot.entries {
            let expires_at = UNIX_EPOCH + Duration::from_millis(entry.expires_at);
            if expires_at <= now {
                continue;
            }
            let Some(data) = RecordData::parse(entry.rtype, &entry.value) else {
                debug!(name = %entry.name, rtype = %entry.rtype, value = %entry.value, "Skipping undecodable snapshot entry");
                continue;
            };
            cache.insert(&entry.name, data, entry.ttl, expires_at);
        }

        Ok(cache)
    }

    /// Write every entry to `path`. The file is written to a sibling
    /// temporary path first and renamed into place.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize> {
        let snapshot = self.to_snapshot();
        let count = snapshot.entries.len();
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|source| Error::SnapshotFormat {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = tmp_path(path);
        let io_err = |source| Error::SnapshotIo {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        Ok(count)
    }

    fn insert(&self, name: &str, data: RecordData, ttl: u32, expires_at: SystemTime) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let inner = entries.entry(data.record_type()).or_default();
        inner.insert(
            normalize(name).into_owned(),
            CacheEntry {
                data,
                ttl,
                expires_at,
            },
        );
    }

    fn to_snapshot(&self) -> Snapshot {
        let entries = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .flat_map(|(rtype, inner)| {
                    inner.iter().map(|(name, entry)| SnapshotEntry {
                        name: name.clone(),
                        rtype: *rtype,
                        value: entry.data.to_string(),
                        ttl: entry.ttl,
                        expires_at: unix_millis(entry.expires_at),
                    })
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        Snapshot {
            version: SNAPSHOT_VERSION,
            entries,
        }
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    name: String,
    #[serde(rename = "type")]
    rtype: RecordType,
    value: String,
    ttl: u32,
    /// Unix time in milliseconds.
    expires_at: u64,
}

fn normalize(name: &str) -> Cow<'_, str> {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(name.to_ascii_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
