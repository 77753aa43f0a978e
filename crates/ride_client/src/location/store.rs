//! Durable last-known-location cache keyed by purpose.
//!
//! Writes are last-writer-wins. The file-backed store keeps one versioned JSON
//! document and replaces it atomically (temp file + rename) on every save.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use ride_core::position::{CachedLocation, PositionPurpose, PositionSample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOCATION_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("location store io error: {0}")]
    Io(String),
    #[error("invalid location store: {0}")]
    InvalidFormat(String),
}

pub trait LocationStore: Send + Sync {
    fn load(&self, purpose: PositionPurpose) -> Result<Option<CachedLocation>, StoreError>;
    fn save(&self, cached: &CachedLocation) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryLocationStore {
    entries: Mutex<HashMap<PositionPurpose, PositionSample>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocationStore for MemoryLocationStore {
    fn load(&self, purpose: PositionPurpose) -> Result<Option<CachedLocation>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(&purpose)
            .map(|sample| CachedLocation::new(purpose, *sample)))
    }

    fn save(&self, cached: &CachedLocation) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(cached.purpose, cached.sample);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LocationFileV1 {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, PositionSample>,
}

impl LocationFileV1 {
    fn empty() -> Self {
        Self {
            version: LOCATION_FILE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Location cache persisted to a JSON file.
#[derive(Debug)]
pub struct JsonFileLocationStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileLocationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocationStore for JsonFileLocationStore {
    fn load(&self, purpose: PositionPurpose) -> Result<Option<CachedLocation>, StoreError> {
        let file = load_file(&self.path)?;
        Ok(file
            .entries
            .get(purpose.key())
            .map(|sample| CachedLocation::new(purpose, *sample)))
    }

    fn save(&self, cached: &CachedLocation) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = match load_file(&self.path) {
            Ok(file) => file,
            Err(StoreError::InvalidFormat(_)) => LocationFileV1::empty(),
            Err(error) => return Err(error),
        };
        file.entries
            .insert(cached.purpose.key().to_string(), cached.sample);
        save_file_atomic(&self.path, &file)
    }
}

fn load_file(path: &Path) -> Result<LocationFileV1, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LocationFileV1::empty())
        }
        Err(error) => {
            return Err(StoreError::Io(format!(
                "failed to read location file '{}': {error}",
                path.display()
            )))
        }
    };

    let file: LocationFileV1 = serde_json::from_str(&contents).map_err(|error| {
        StoreError::InvalidFormat(format!(
            "invalid location file '{}': {error}",
            path.display()
        ))
    })?;

    if file.version != LOCATION_FILE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "unsupported location file version {} in '{}'",
            file.version,
            path.display()
        )));
    }
    Ok(file)
}

fn save_file_atomic(path: &Path, file: &LocationFileV1) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            StoreError::Io(format!(
                "failed to create location directory '{}': {error}",
                parent.display()
            ))
        })?;
    }

    let serialized = serde_json::to_string_pretty(file).map_err(|error| {
        StoreError::Io(format!("failed to serialize locations to json: {error}"))
    })?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("json.tmp.{nanos}"));
    let mut temp_file = File::create(&temp_path).map_err(|error| {
        StoreError::Io(format!(
            "failed to create temp location file '{}': {error}",
            temp_path.display()
        ))
    })?;
    temp_file
        .write_all(serialized.as_bytes())
        .and_then(|()| temp_file.sync_all())
        .map_err(|error| {
            StoreError::Io(format!(
                "failed to write temp location file '{}': {error}",
                temp_path.display()
            ))
        })?;

    fs::rename(&temp_path, path).map_err(|error| {
        let _ = fs::remove_file(&temp_path);
        StoreError::Io(format!(
            "failed to replace location file '{}': {error}",
            path.display()
        ))
    })
}
