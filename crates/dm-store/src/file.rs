// file.rs — JsonFileKvStore: one file per key under a directory.
//
// Keys map to file names by replacing '/' and ':' with '~', e.g.
// `streak/category/2026-05-11` → `<dir>/streak~category~2026-05-11.json`.
// This keeps the store easy to inspect manually.
//
// `set_if_absent` writes the value to a temp file and publishes it with
// `hard_link`, which fails atomically when the target exists. A key file is
// therefore either absent or complete, and two processes sharing the
// directory still agree on one value. An empty key file (left by an older
// writer or a truncated copy) reads as absent and is replaced on the next
// `set_if_absent`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::{check_key, KeyValueStore};

/// Directory-backed key-value store.
pub struct JsonFileKvStore {
    dir: PathBuf,
    /// Serializes writers inside this process; cross-process safety comes
    /// from `hard_link`.
    write_lock: Mutex<()>,
}

impl JsonFileKvStore {
    /// Create a store backed by `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_file(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if matches!(c, '/' | ':') { '~' } else { c })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    /// Sibling temp file, unique per process.
    fn temp_file(path: &Path) -> PathBuf {
        path.with_extension(format!("json.{}.tmp", std::process::id()))
    }

    fn write_temp(path: &Path, value: &str) -> Result<PathBuf, StoreError> {
        let tmp = Self::temp_file(path);
        fs::write(&tmp, value).map_err(|source| StoreError::IoError {
            path: tmp.display().to_string(),
            source,
        })?;
        Ok(tmp)
    }

    fn replace(tmp: &Path, path: &Path) -> Result<(), StoreError> {
        fs::rename(tmp, path).map_err(|source| StoreError::IoError {
            path: path.display().to_string(),
            source,
        })
    }

    fn read(path: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(path) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::IoError {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

impl KeyValueStore for JsonFileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        Self::read(&self.key_file(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.key_file(key);
        // Readers never see a half-written value.
        let tmp = Self::write_temp(&path, value)?;
        Self::replace(&tmp, &path)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.key_file(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::IoError {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn set_if_absent(&self, key: &str, value: &str) -> Result<String, StoreError> {
        check_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.key_file(key);
        let tmp = Self::write_temp(&path, value)?;
        let linked = fs::hard_link(&tmp, &path);
        match linked {
            Ok(()) => {
                let _ = fs::remove_file(&tmp);
                Ok(value.to_string())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match Self::read(&path) {
                Ok(Some(existing)) => {
                    let _ = fs::remove_file(&tmp);
                    Ok(existing)
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp);
                    Err(e)
                }
                Ok(None) => {
                    tracing::warn!(path = %path.display(), "replacing empty key file");
                    Self::replace(&tmp, &path)?;
                    Ok(value.to_string())
                }
            },
            Err(source) => {
                let _ = fs::remove_file(&tmp);
                Err(StoreError::IoError {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }
}
