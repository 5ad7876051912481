//! File-backed option store.
//!
//! The whole option table lives in one JSON object. Every mutation rewrites
//! the file through a temp file + rename so a crash never leaves it half written.
//!
//! Nothing is cached between calls: reads go to disk, and every mutation runs
//! read-modify-write while holding an exclusive `<file>.lock` sidecar. Several
//! handles on one file (or several processes) therefore see each other's
//! writes, and `add` is a compare-and-set against what is on disk.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::OptionStore;
use crate::core::{StoreError, StoreResult};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_WAIT: Duration = Duration::from_secs(5);
/// A sidecar older than this was left behind by a crashed writer.
const LOCK_ABANDONED_AFTER: Duration = Duration::from_secs(60);

type OptionMap = BTreeMap<String, Value>;

pub struct FileOptionStore {
    path: PathBuf,
}

impl FileOptionStore {
    /// Opens the store at `path`, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!("option file '{}' not found, starting empty", path.display());
        }
        let store = Self { path };
        // Reject a corrupt file up front.
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn load(&self) -> StoreResult<OptionMap> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(OptionMap::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(OptionMap::new());
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(StoreError::Corrupt {
                key: self.path.display().to_string(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    /// Runs `change` against the on-disk map under the sidecar lock and
    /// writes the map back when `change` reports a modification.
    fn mutate<T>(&self, change: impl FnOnce(&mut OptionMap) -> (bool, T)) -> StoreResult<T> {
        let _guard = SidecarLock::acquire(self.lock_path())?;
        let mut values = self.load()?;
        let (dirty, result) = change(&mut values);
        if dirty {
            write_json_atomic(&self.path, &values)?;
        }
        Ok(result)
    }
}

impl OptionStore for FileOptionStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.mutate(|values| {
            values.insert(key.to_string(), value);
            (true, ())
        })
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        self.mutate(|values| {
            let existed = values.remove(key).is_some();
            (existed, existed)
        })
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }

    fn add(&mut self, key: &str, value: Value) -> StoreResult<bool> {
        self.mutate(|values| {
            if values.contains_key(key) {
                return (false, false);
            }
            values.insert(key.to_string(), value);
            (true, true)
        })
    }
}

/// Exclusive-create lock file, removed on drop.
struct SidecarLock {
    path: PathBuf,
}

impl SidecarLock {
    fn acquire(path: PathBuf) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut waited = Duration::ZERO;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }

            if is_abandoned(&path) {
                warn!("Removing abandoned option lock '{}'", path.display());
                let _ = fs::remove_file(&path);
                continue;
            }
            if waited >= LOCK_WAIT {
                return Err(StoreError::Unavailable(format!(
                    "option file is locked by another writer ('{}')",
                    path.display()
                )));
            }
            thread::sleep(LOCK_RETRY_INTERVAL);
            waited += LOCK_RETRY_INTERVAL;
        }
    }
}

impl Drop for SidecarLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("Failed to remove option lock '{}': {}", self.path.display(), err);
        }
    }
}

fn is_abandoned(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= LOCK_ABANDONED_AFTER)
}

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    temp.write_all(b"\n")?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
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
