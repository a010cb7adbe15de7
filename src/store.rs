//src/store.rs
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::model::{Workout, WorkoutTemplate};

pub const ACTIVE_WORKOUT_KEY: &str = "activeWorkout";
pub const HISTORY_KEY: &str = "workoutHistory";
pub const CUSTOM_TEMPLATES_KEY: &str = "customTemplates";

const APP_DATA_DIR: &str = "liftlog"; // Same dir name as config

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing record '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize record '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// String key-value storage holding one JSON blob per record.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Stores each record as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::write(self.path(key), value).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

/// Default directory for session data.
pub fn get_data_dir() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir().ok_or(StoreError::DataDir)?;
    Ok(data_dir.join(APP_DATA_DIR))
}

/// Loads the in-progress workout. A corrupt record is discarded.
pub fn load_active<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<Option<Workout>, StoreError> {
    let Some(raw) = store.get(ACTIVE_WORKOUT_KEY)? else {
        return Ok(None);
    };
    match serde_json::from_str::<Workout>(&raw) {
        Ok(workout) => Ok(Some(workout)),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable active workout record");
            store.remove(ACTIVE_WORKOUT_KEY)?;
            Ok(None)
        }
    }
}

/// Loads finished workouts in stored order (newest first). A corrupt record
/// is logged and treated as empty.
pub fn load_history<S: KeyValueStore + ?Sized>(store: &S) -> Result<Vec<Workout>, StoreError> {
    load_list(store, HISTORY_KEY)
}

/// Loads custom templates, migrating legacy exercise entries.
pub fn load_templates<S: KeyValueStore + ?Sized>(
    store: &S,
) -> Result<Vec<WorkoutTemplate>, StoreError> {
    load_list(store, CUSTOM_TEMPLATES_KEY)
}

fn load_list<T, S>(store: &S, key: &str) -> Result<Vec<T>, StoreError>
where
    T: serde::de::DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(raw) = store.get(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => {
            debug!(key, count = items.len(), "Loaded record");
            Ok(items)
        }
        Err(e) => {
            error!(key, error = %e, "Failed to parse stored record; ignoring it");
            Ok(Vec::new())
        }
    }
}

pub fn save_active<S: KeyValueStore + ?Sized>(
    store: &mut S,
    active: Option<&Workout>,
) -> Result<(), StoreError> {
    match active {
        Some(workout) => write_json(store, ACTIVE_WORKOUT_KEY, workout),
        None => store.remove(ACTIVE_WORKOUT_KEY),
    }
}

pub fn save_history<S: KeyValueStore + ?Sized>(
    store: &mut S,
    history: &[Workout],
) -> Result<(), StoreError> {
    write_json(store, HISTORY_KEY, &history)
}

pub fn save_templates<S: KeyValueStore + ?Sized>(
    store: &mut S,
    templates: &[WorkoutTemplate],
) -> Result<(), StoreError> {
    write_json(store, CUSTOM_TEMPLATES_KEY, &templates)
}

fn write_json<T, S>(store: &mut S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: serde::Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let json = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &json)
}
