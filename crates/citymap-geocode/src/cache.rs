//! Persistent place-name → coordinate cache.
//!
//! The whole mapping lives in memory and is rewritten to a single JSON file
//! after every change. Writes go to a sibling temp file which is then renamed
//! over the cache, so a crash leaves either the old or the new snapshot.
//! All mutations hold one lock for the duration of the write.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CacheError;
use crate::types::CacheEntry;

const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    lat: Option<f64>,
    lon: Option<f64>,
    cached_at: DateTime<Utc>,
}

impl StoredEntry {
    fn entry(&self) -> CacheEntry {
        CacheEntry {
            latitude: self.lat,
            longitude: self.lon,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, StoredEntry>,
}

/// A cache hit together with the time it was written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedLookup {
    pub entry: CacheEntry,
    pub cached_at: DateTime<Utc>,
}

/// Dump formats for [`CoordinateCache::export`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `city,lat,lon` with one row per entry; absent coordinates are empty
    Csv,
    /// Object keyed by place name, each value `[lat, lon]` or `[null, null]`
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// File name used when the caller gives no output path.
    pub fn default_file_name(&self) -> String {
        format!("dump.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(CacheError::Export(format!(
                "unsupported format '{}', expected csv or json",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
struct ExportRow<'a> {
    city: &'a str,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Coordinate cache backed by a single JSON file.
#[derive(Debug)]
pub struct CoordinateCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl CoordinateCache {
    /// Load the cache stored at `path`.
    ///
    /// Never fails: a missing file yields an empty cache, and an unreadable or
    /// corrupt file is logged and discarded (the next write replaces it).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::read_entries(&path);
        tracing::info!(
            "Loaded {} cached coordinates from {}",
            entries.len(),
            path.display()
        );
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn read_entries(path: &Path) -> BTreeMap<String, StoredEntry> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No coordinate cache at {}, starting empty", path.display());
                return BTreeMap::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Coordinate cache {} unreadable ({}), starting empty",
                    path.display(),
                    e
                );
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<CacheFile>(&contents) {
            Ok(file) if file.version == CACHE_FORMAT_VERSION => file.entries,
            Ok(file) => {
                tracing::warn!(
                    "Coordinate cache {} has unsupported version {}, discarding",
                    path.display(),
                    file.version
                );
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    "Coordinate cache {} is corrupt ({}), discarding",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pure lookup.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).map(StoredEntry::entry)
    }

    /// Lookup including the time the entry was written.
    pub fn lookup(&self, key: &str) -> Option<CachedLookup> {
        self.entries.lock().get(key).map(|stored| CachedLookup {
            entry: stored.entry(),
            cached_at: stored.cached_at,
        })
    }

    /// Insert or overwrite `key`, then rewrite the cache file before returning.
    ///
    /// If the write fails the in-memory mapping is rolled back, so the cache
    /// never holds an entry that was not persisted.
    ///
    /// # Errors
    /// [`CacheError`] when the snapshot cannot be serialized or written.
    pub fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        let stored = StoredEntry {
            lat: entry.latitude,
            lon: entry.longitude,
            cached_at: Utc::now(),
        };
        let previous = entries.insert(key.to_string(), stored);

        if let Err(e) = Self::write_snapshot(&self.path, &entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            tracing::error!("Failed to persist cache entry for '{}': {}", key, e);
            return Err(e);
        }

        tracing::debug!("Cached '{}' ({} entries)", key, entries.len());
        Ok(())
    }

    /// Drop one entry so the next lookup queries the provider again.
    ///
    /// # Errors
    /// [`CacheError`] when the updated snapshot cannot be written.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock();
        let Some(old) = entries.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = Self::write_snapshot(&self.path, &entries) {
            entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(true)
    }

    /// Drop every negative entry. Returns how many were removed.
    ///
    /// # Errors
    /// [`CacheError`] when the updated snapshot cannot be written.
    pub fn clear_negative(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let kept: BTreeMap<String, StoredEntry> = entries
            .iter()
            .filter(|(_, stored)| !stored.entry().is_negative())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = entries.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        Self::write_snapshot(&self.path, &kept)?;
        *entries = kept;
        Ok(removed)
    }

    /// Drop everything.
    ///
    /// # Errors
    /// [`CacheError`] when the empty snapshot cannot be written.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        Self::write_snapshot(&self.path, &BTreeMap::new())?;
        entries.clear();
        Ok(())
    }

    /// Rewrite the cache file from memory.
    ///
    /// # Errors
    /// [`CacheError`] when the snapshot cannot be serialized or written.
    pub fn flush(&self) -> Result<(), CacheError> {
        let entries = self.entries.lock();
        Self::write_snapshot(&self.path, &entries)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Cached place names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Dump the full cache to `path`. Returns the number of entries written.
    ///
    /// # Errors
    /// [`CacheError::Write`] if the file cannot be created, or
    /// [`CacheError::Export`] if encoding fails.
    pub fn export(&self, format: ExportFormat, path: &Path) -> Result<usize, CacheError> {
        let file = std::fs::File::create(path).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        let count = self.export_to_writer(format, std::io::BufWriter::new(file))?;
        tracing::info!("Exported {} entries as {} to {}", count, format, path.display());
        Ok(count)
    }

    /// Dump the full cache into any writer.
    ///
    /// # Errors
    /// [`CacheError::Export`] if encoding or writing fails.
    pub fn export_to_writer<W: Write>(
        &self,
        format: ExportFormat,
        mut writer: W,
    ) -> Result<usize, CacheError> {
        let entries = self.entries.lock();

        match format {
            ExportFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(writer);
                for (city, stored) in entries.iter() {
                    csv_writer.serialize(ExportRow {
                        city,
                        lat: stored.lat,
                        lon: stored.lon,
                    })?;
                }
                csv_writer
                    .flush()
                    .map_err(|e| CacheError::Export(e.to_string()))?;
            }
            ExportFormat::Json => {
                let dump: BTreeMap<&str, [Option<f64>; 2]> = entries
                    .iter()
                    .map(|(city, stored)| (city.as_str(), [stored.lat, stored.lon]))
                    .collect();
                serde_json::to_writer_pretty(&mut writer, &dump)?;
                writer
                    .write_all(b"\n")
                    .and_then(|_| writer.flush())
                    .map_err(|e| CacheError::Export(e.to_string()))?;
            }
        }

        Ok(entries.len())
    }

    fn write_snapshot(
        path: &Path,
        entries: &BTreeMap<String, StoredEntry>,
    ) -> Result<(), CacheError> {
        let write_err = |source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let snapshot = CacheFileRef {
            version: CACHE_FORMAT_VERSION,
            entries,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = temp_path_for(path);
        let result = std::fs::File::create(&tmp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp_path, path));

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_err(e));
        }
        Ok(())
    }
}

/// Borrowing twin of [`CacheFile`] so snapshots serialize without cloning.
#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, StoredEntry>,
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "geocode_cache".into());
    name.push(".tmp");
    path.with_file_name(name)
}
